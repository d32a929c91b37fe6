//! Destination cleanup against the persisted index.
//!
//! The mirror directory is indexed with a local lister under the source's
//! URL, so local and remote records compare by URL. Files present locally
//! but absent from the index are excess and get deleted; files in the index
//! but not on disk are reported as missing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Config, Tree};
use crate::pipeline::diff::{DiffEngine, DiffMode};
use crate::pipeline::filter::EntryFilter;
use crate::pipeline::index::IndexBuilder;
use crate::pipeline::pool::PoolConfig;
use crate::services::{LocalLister, source_root_url};
use crate::storage::IndexStore;
use crate::utils::log;
use crate::utils::url::file_name;

/// Options for a trim run.
#[derive(Debug, Clone, Default)]
pub struct TrimOptions {
    /// Report only; delete nothing.
    pub dry_run: bool,
}

/// What a trim run found and did.
#[derive(Debug, Clone, Default)]
pub struct TrimReport {
    pub excess: usize,
    pub missing: usize,
    pub removed: usize,
    /// Index files not present on disk
    pub missing_files: Tree,
}

/// Remove from `<destination>/<distro>` every file the index does not know.
pub async fn run_trim(
    config: &Config,
    store: &dyn IndexStore,
    options: &TrimOptions,
) -> Result<TrimReport> {
    let root = config.mirror_root();
    log::header(&format!("Trimming {}", root.display()));

    let index = store.load().await?.ok_or_else(|| {
        AppError::config(format!(
            "no index at {}; run a mirror first",
            store.location()
        ))
    })?;

    log::step(1, 3, "Scanning destination (may take a while)...");
    let root_url = source_root_url(config)?;
    let scan = IndexBuilder::new(
        Arc::new(LocalLister::new(&root)),
        EntryFilter::accept_all(),
        PoolConfig::new(config.crawler.workers, &config.pool),
    )
    .build(&root_url)
    .await?;
    if !scan.is_clean() {
        return Err(AppError::crawl(
            root.display().to_string(),
            format!("{} director(ies) could not be scanned", scan.failed_dirs),
        ));
    }
    log::sub_item(&format!("{} files on disk", scan.tree.file_count()));

    log::step(2, 3, "Comparing to source structure...");
    let engine = DiffEngine::new(PoolConfig::new(config.diff.workers, &config.pool));
    let index = Arc::new(index);
    let local = Arc::new(scan.tree);
    let excess = engine.tree_diff(&index, &local, DiffMode::UrlOnly).await?;
    let missing = engine.tree_diff(&local, &index, DiffMode::UrlOnly).await?;

    let mut report = TrimReport {
        excess: excess.file_count(),
        missing: missing.file_count(),
        removed: 0,
        missing_files: missing,
    };
    log::summary(
        "Summary",
        &[
            ("Excess", report.excess.to_string()),
            ("Missing", report.missing.to_string()),
        ],
    );

    if options.dry_run {
        for (path, file) in excess.walk_files() {
            log::sub_item(&format!("would delete /{}", local_path(&path, &file.url)));
        }
        return Ok(report);
    }

    log::step(3, 3, "Deleting excess files...");
    report.removed = remove_files(&root, &excess).await?;
    log::success(&format!("Removed {} files", report.removed));
    Ok(report)
}

/// Delete every file of `tree` below `root`, then any directories left
/// empty, up to (not including) `root`. Returns the number of files removed.
pub async fn remove_files(root: &Path, tree: &Tree) -> Result<usize> {
    let mut removed = 0;
    for (path, file) in tree.walk_files() {
        let Some(target) = target_path(root, &path, &file.url) else {
            log::warn(&format!("refusing to delete {}", file.url));
            continue;
        };
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                removed += 1;
                if let Some(dir) = target.parent() {
                    remove_empty_dirs(root, dir).await;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                log::warn(&format!("could not delete {}: {}", target.display(), e));
            }
        }
    }
    Ok(removed)
}

fn target_path(root: &Path, path: &[String], url: &str) -> Option<PathBuf> {
    let name = file_name(url)?;
    let unsafe_segment = |s: &str| s.is_empty() || s == "." || s == ".." || s.contains('/');
    if unsafe_segment(&name) || path.iter().any(|s| unsafe_segment(s.as_str())) {
        return None;
    }
    let dir = path.iter().fold(root.to_path_buf(), |dir, segment| dir.join(segment));
    Some(dir.join(name))
}

fn local_path(path: &[String], url: &str) -> String {
    let mut segments = path.to_vec();
    segments.extend(file_name(url));
    segments.join("/")
}

async fn remove_empty_dirs(root: &Path, dir: &Path) {
    let mut current = dir.to_path_buf();
    while current != root && current.starts_with(root) {
        if tokio::fs::remove_dir(&current).await.is_err() {
            break;
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}
