//! Index building: crawl a source into a [`Tree`].
//!
//! Every directory is one pool job. Listing a directory yields that
//! directory's files as a result and its subdirectories as new jobs, so the
//! crawl fans out breadth-first across the pool's workers. The supervisor
//! merges each directory's contribution into the tree as it arrives.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Config, FileEntry, ListingEntry, Tree, TreePath, normalize_entry};
use crate::pipeline::filter::EntryFilter;
use crate::pipeline::pool::{JobHandler, JobOutput, PoolConfig, WorkerPool};
use crate::services::{DirLocation, DirectoryLister, Source};

/// Files and subdirectory names found in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirContribution {
    pub path: TreePath,
    pub files: Vec<FileEntry>,
    pub subdirs: Vec<String>,
}

/// Result of one crawl.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub tree: Tree,
    pub dirs_listed: u64,
    pub failed_dirs: u64,
    /// `false` when the crawl was force-terminated
    pub complete: bool,
}

impl BuildReport {
    /// Every directory was listed and the crawl settled on its own.
    pub fn is_clean(&self) -> bool {
        self.complete && self.failed_dirs == 0
    }
}

struct ListingHandler {
    lister: Arc<dyn DirectoryLister>,
    filter: EntryFilter,
}

#[async_trait]
impl JobHandler for ListingHandler {
    type Job = DirLocation;
    type Output = DirContribution;

    fn describe(&self, job: &DirLocation) -> String {
        job.url.clone()
    }

    async fn handle(&self, dir: DirLocation) -> Result<JobOutput<DirLocation, DirContribution>> {
        let raw_entries = self.lister.list(&dir).await?;

        let mut output = JobOutput::empty();
        let mut contribution = DirContribution {
            path: dir.path.clone(),
            files: Vec::new(),
            subdirs: Vec::new(),
        };
        let mut seen = HashSet::new();
        let mut skipped = 0usize;

        for raw in &raw_entries {
            match normalize_entry(&dir.url, raw) {
                Some(ListingEntry::File(file)) => {
                    if self.filter.accepts(&file.url) && seen.insert(file.url.clone()) {
                        contribution.files.push(file);
                    }
                }
                Some(ListingEntry::Directory { name, url }) => {
                    if self.filter.accepts(&url) && seen.insert(url.clone()) {
                        output.push_job(dir.child(name.clone(), url));
                        contribution.subdirs.push(name);
                    }
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::trace!("{}: skipped {} record(s)", dir.url, skipped);
        }
        log::debug!(
            "{}: {} file(s), {} subdirectory(ies)",
            dir.url,
            contribution.files.len(),
            contribution.subdirs.len()
        );

        output.push_result(contribution);
        Ok(output)
    }
}

/// Crawls a directory tree with a worker pool.
pub struct IndexBuilder {
    lister: Arc<dyn DirectoryLister>,
    filter: EntryFilter,
    pool: PoolConfig,
}

impl IndexBuilder {
    pub fn new(lister: Arc<dyn DirectoryLister>, filter: EntryFilter, pool: PoolConfig) -> Self {
        Self {
            lister,
            filter,
            pool,
        }
    }

    /// Builder for a configured source, using its filters and crawler workers.
    pub fn from_config(source: &Source, config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::clone(&source.lister),
            config.filter()?,
            PoolConfig::new(config.crawler.workers, &config.pool),
        ))
    }

    /// Crawl everything reachable from `root_url`.
    ///
    /// The root itself is always listed; the filter applies to everything
    /// below it. A directory that fails to list is dropped with its subtree.
    pub async fn build(&self, root_url: &str) -> Result<BuildReport> {
        let pool = WorkerPool::new(
            ListingHandler {
                lister: Arc::clone(&self.lister),
                filter: self.filter.clone(),
            },
            self.pool.clone(),
        );

        let mut tree = Tree::new();
        let mut listed = HashSet::new();
        let report = pool
            .run(vec![DirLocation::root(root_url)], |contribution| {
                merge_contribution(&mut tree, &mut listed, contribution)
            })
            .await?;

        if !report.completed {
            log::warn!("Crawl of {} was terminated before it settled", root_url);
        }
        if report.jobs_failed > 0 {
            log::warn!(
                "{} director(ies) under {} could not be listed",
                report.jobs_failed,
                root_url
            );
        }

        Ok(BuildReport {
            tree,
            dirs_listed: report.jobs_completed,
            failed_dirs: report.jobs_failed,
            complete: report.completed,
        })
    }
}

fn merge_contribution(
    tree: &mut Tree,
    listed: &mut HashSet<TreePath>,
    contribution: DirContribution,
) -> Result<()> {
    if !listed.insert(contribution.path.clone()) {
        return Err(AppError::invariant(format!(
            "directory /{} listed twice",
            contribution.path.join("/")
        )));
    }

    let node = tree.node_mut(&contribution.path)?;
    for name in &contribution.subdirs {
        node.node_mut(std::slice::from_ref(name))?;
    }
    tree.insert_files(&contribution.path, contribution.files)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::time::Duration;

    use crate::models::{PoolSettings, RawEntry};
    use crate::services::LocalLister;

    /// Serves canned listings keyed by directory URL.
    struct FakeLister {
        pages: HashMap<String, Vec<RawEntry>>,
    }

    impl FakeLister {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
            }
        }

        fn page(mut self, url: &str, entries: &[(&str, &str, &str)]) -> Self {
            let records = entries
                .iter()
                .map(|(hint, href, size)| RawEntry {
                    type_hint: hint.to_string(),
                    href: href.to_string(),
                    timestamp: "2026-10-01 12:00".to_string(),
                    size: size.to_string(),
                    description: String::new(),
                })
                .collect();
            self.pages.insert(url.to_string(), records);
            self
        }
    }

    #[async_trait]
    impl DirectoryLister for FakeLister {
        async fn list(&self, dir: &DirLocation) -> Result<Vec<RawEntry>> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.pages
                .get(&dir.url)
                .cloned()
                .ok_or_else(|| AppError::listing(dir.url.clone(), "404 Not Found"))
        }
    }

    fn sample_lister() -> FakeLister {
        FakeLister::new()
            .page(
                "http://h/r/",
                &[
                    ("[PARENTDIR]", "/", "-"),
                    ("[   ]", "a.txt", "10"),
                    ("[DIR]", "sub/", "-"),
                    ("[DIR]", "empty/", "-"),
                    ("[   ]", "a.txt", "10"),
                ],
            )
            .page(
                "http://h/r/sub/",
                &[("[PARENTDIR]", "/r/", "-"), ("[   ]", "b.bin", "20")],
            )
            .page("http://h/r/empty/", &[])
    }

    fn pool() -> PoolConfig {
        let settings = PoolSettings {
            quiescence_threshold: 3,
            poll_interval_ms: 2,
            max_observations: 0,
        };
        PoolConfig::new(4, &settings)
    }

    fn builder(lister: FakeLister, filter: EntryFilter) -> IndexBuilder {
        IndexBuilder::new(Arc::new(lister), filter, pool())
    }

    #[tokio::test]
    async fn test_build_produces_tree() {
        let report = builder(sample_lister(), EntryFilter::accept_all())
            .build("http://h/r/")
            .await
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.dirs_listed, 3);

        let tree = report.tree;
        assert_eq!(tree.files.len(), 1);
        assert_eq!(tree.files[0].url, "http://h/r/a.txt");
        assert_eq!(tree.files[0].size, "10");

        let sub = tree.files_at(&["sub".to_string()]);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub[0].url, "http://h/r/sub/b.bin");

        let empty = tree.node(&["empty".to_string()]).unwrap();
        assert!(empty.files.is_empty());
        assert!(empty.children.is_empty());
    }

    #[tokio::test]
    async fn test_filter_prunes_files_and_directories() {
        let filter = EntryFilter::new(&[r"(/|\.bin)$"], &["/empty/"]).unwrap();
        let report = builder(sample_lister(), filter)
            .build("http://h/r/")
            .await
            .unwrap();

        let tree = report.tree;
        assert!(tree.files.is_empty());
        assert_eq!(tree.files_at(&["sub".to_string()]).len(), 1);
        assert!(tree.node(&["empty".to_string()]).is_none());
        assert_eq!(report.dirs_listed, 2);
    }

    #[tokio::test]
    async fn test_narrower_filter_yields_subset() {
        let wide = builder(sample_lister(), EntryFilter::accept_all())
            .build("http://h/r/")
            .await
            .unwrap();
        let narrow = builder(sample_lister(), EntryFilter::new(&["sub"], &[]).unwrap())
            .build("http://h/r/")
            .await
            .unwrap();

        let wide_urls: HashSet<_> = wide.tree.walk_files().into_iter().map(|(_, f)| f.url.clone()).collect();
        for (_, file) in narrow.tree.walk_files() {
            assert!(wide_urls.contains(&file.url));
        }
        assert_eq!(narrow.tree.file_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_directory_is_dropped() {
        let lister = FakeLister::new().page(
            "http://h/r/",
            &[("[   ]", "a.txt", "1"), ("[DIR]", "gone/", "-")],
        );
        let report = builder(lister, EntryFilter::accept_all())
            .build("http://h/r/")
            .await
            .unwrap();

        assert!(report.complete);
        assert_eq!(report.failed_dirs, 1);
        assert!(!report.is_clean());
        assert_eq!(report.tree.file_count(), 1);
        assert!(report.tree.node(&["gone".to_string()]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_directory_name_fails_build() {
        let lister = FakeLister::new()
            .page("http://h/r/", &[("[DIR]", "files/", "-")])
            .page("http://h/r/files/", &[]);
        let result = builder(lister, EntryFilter::accept_all())
            .build("http://h/r/")
            .await;
        assert!(matches!(result, Err(AppError::Invariant(_))));
    }

    #[tokio::test]
    async fn test_build_local_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("pool/main")).unwrap();
        std::fs::write(tmp.path().join("Release"), b"release").unwrap();
        std::fs::write(tmp.path().join("pool/main/p q.deb"), b"deb").unwrap();

        let lister = Arc::new(LocalLister::new(tmp.path()));
        let report = IndexBuilder::new(lister, EntryFilter::accept_all(), pool())
            .build("file:///mirror/")
            .await
            .unwrap();

        assert!(report.is_clean());
        let files = report
            .tree
            .files_at(&["pool".to_string(), "main".to_string()]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].url, "file:///mirror/pool/main/p%20q.deb");
        assert_eq!(files[0].size, "3");
        assert_eq!(report.tree.files[0].size, "7");
    }
}
