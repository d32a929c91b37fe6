//! Mirror run: crawl, compare with the last index, fetch and prune.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Config, Tree};
use crate::pipeline::diff::{Classification, DiffEngine};
use crate::pipeline::index::IndexBuilder;
use crate::pipeline::pool::PoolConfig;
use crate::pipeline::trim::remove_files;
use crate::services::{DownloadManager, DownloadReport, Source, download_jobs};
use crate::storage::IndexStore;
use crate::utils::log;

/// Options for a mirror run.
#[derive(Debug, Clone, Default)]
pub struct MirrorOptions {
    /// Crawl and classify only; touch nothing.
    pub dry_run: bool,
}

/// What a mirror run did.
#[derive(Debug, Clone, Default)]
pub struct MirrorReport {
    pub files_indexed: usize,
    pub dirs_failed: u64,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub persisted: bool,
    pub downloads: Option<DownloadReport>,
    pub removed: usize,
}

/// Bring `<destination>/<distro>` in line with the source.
///
/// The new index is persisted only after a clean crawl, and without the
/// files whose download failed, so those are offered again next run.
pub async fn run_mirror(
    config: &Config,
    source: &Source,
    store: &dyn IndexStore,
    downloader: &dyn DownloadManager,
    options: &MirrorOptions,
) -> Result<MirrorReport> {
    let total_steps = 5;
    log::header(&format!("Mirroring {}", source.root_url));

    // Step 1: download manager
    log::step(1, total_steps, "Checking download manager...");
    if options.dry_run {
        log::sub_item("skipped (dry run)");
    } else {
        downloader.check().await?;
        log::sub_item("reachable");
    }

    // Step 2: crawl
    log::step(2, total_steps, "Building index...");
    let build = IndexBuilder::from_config(source, config)?
        .build(&source.root_url)
        .await?;
    let clean = build.is_clean();
    log::sub_item(&format!(
        "{} files in {} directories",
        build.tree.file_count(),
        build.dirs_listed
    ));
    if build.failed_dirs > 0 {
        log::warn(&format!("{} directories could not be listed", build.failed_dirs));
    }

    // Step 3: previous index
    log::step(3, total_steps, "Loading previous index...");
    let old = store.load().await?;
    match &old {
        Some(tree) => log::sub_item(&format!("{} files in {}", tree.file_count(), store.location())),
        None => log::sub_item("none found, treating every file as new"),
    }

    // Step 4: classify
    log::step(4, total_steps, "Comparing indexes...");
    let engine = DiffEngine::new(PoolConfig::new(config.diff.workers, &config.pool));
    let new_tree = build.tree;
    let classification = engine.classify(old, new_tree.clone()).await?;

    let files_indexed = new_tree.file_count();
    let mut report = MirrorReport {
        files_indexed,
        dirs_failed: build.failed_dirs,
        added: classification.added.file_count(),
        updated: classification.updated.file_count(),
        deleted: classification.deleted.file_count(),
        unchanged: files_indexed - classification.new_files.file_count(),
        ..MirrorReport::default()
    };
    print_summary(&report);

    if options.dry_run {
        log::info("Dry run: nothing persisted, downloaded or deleted");
        return Ok(report);
    }

    // Step 5: apply
    log::step(5, total_steps, "Applying changes...");
    let downloads = fetch_new_files(&classification, config, downloader).await?;

    if clean {
        let failed: HashSet<&str> = downloads
            .iter()
            .flat_map(|d| d.failed.iter().map(String::as_str))
            .collect();
        store.save(&new_tree.without_urls(&failed)).await?;
        report.persisted = true;
    } else {
        log::warn("Crawl was incomplete; previous index kept");
    }

    report.removed = remove_deleted(&classification.deleted, config, clean).await?;
    report.downloads = downloads;

    log::success("Mirror run complete");
    Ok(report)
}

async fn fetch_new_files(
    classification: &Classification,
    config: &Config,
    downloader: &dyn DownloadManager,
) -> Result<Option<DownloadReport>> {
    let jobs = download_jobs(&classification.new_files, &config.mirror_root());
    if jobs.is_empty() {
        log::sub_item("Nothing to download");
        return Ok(None);
    }

    log::sub_item(&format!("Submitting {} downloads", jobs.len()));
    let downloads = downloader.fetch_all(jobs).await?;
    if downloads.failed.is_empty() {
        log::sub_item(&format!("{} downloads complete", downloads.completed));
    } else {
        log::warn(&format!(
            "{} of {} downloads failed",
            downloads.failed.len(),
            downloads.submitted
        ));
        for url in &downloads.failed {
            log::sub_item(url);
        }
    }
    Ok(Some(downloads))
}

async fn remove_deleted(deleted: &Tree, config: &Config, clean: bool) -> Result<usize> {
    if deleted.is_empty() {
        return Ok(0);
    }
    if !config.general.delete_removed {
        log::sub_item("Keeping files removed upstream (delete_removed = false)");
        return Ok(0);
    }
    if !clean {
        log::warn("Crawl was incomplete; skipping deletions");
        return Ok(0);
    }

    let root = config.mirror_root();
    let removed = remove_files(&root, deleted).await?;
    log::sub_item(&format!("Removed {} files", removed));
    Ok(removed)
}

fn print_summary(report: &MirrorReport) {
    log::summary(
        "Summary",
        &[
            ("Indexed", report.files_indexed.to_string()),
            ("Added", report.added.to_string()),
            ("Updated", report.updated.to_string()),
            ("Deleted", report.deleted.to_string()),
            ("Unchanged", report.unchanged.to_string()),
            ("Failed dirs", report.dirs_failed.to_string()),
        ],
    );
}
