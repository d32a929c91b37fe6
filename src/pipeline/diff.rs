//! Tree diff and change classification.
//!
//! Everything is built from one primitive: `tree_diff(a, b)` is the part of
//! `b` not present in `a`, node by node. Comparing two indexes in both
//! directions, first on whole records and then on URLs only, splits the
//! files into added, updated and deleted.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{FileEntry, Tree, TreePath};
use crate::pipeline::pool::{JobHandler, JobOutput, PoolConfig, WorkerPool};
use crate::utils::decode_percent;

/// What makes two file records "the same".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    /// Every field must match.
    Full,
    /// Only the (percent-decoded) URL must match.
    UrlOnly,
}

#[derive(PartialEq, Eq, Hash)]
enum Key<'a> {
    Record(&'a FileEntry),
    Location(String),
}

fn key(entry: &FileEntry, mode: DiffMode) -> Key<'_> {
    match mode {
        DiffMode::Full => Key::Record(entry),
        DiffMode::UrlOnly => Key::Location(decode_percent(&entry.url)),
    }
}

/// Records of `b` whose key is absent from `a`, in `b`'s order, each key at
/// most once.
pub fn leaf_diff(a: &[FileEntry], b: &[FileEntry], mode: DiffMode) -> Vec<FileEntry> {
    let known: HashSet<Key> = a.iter().map(|entry| key(entry, mode)).collect();
    let mut emitted = HashSet::new();
    b.iter()
        .filter(|&entry| {
            let k = key(entry, mode);
            !known.contains(&k) && emitted.insert(k)
        })
        .cloned()
        .collect()
}

/// Sparse difference `b \ a`.
///
/// Keys only in `a` are ignored; keys only in `b` are copied whole; shared
/// keys recurse. Nodes with nothing below them are left out.
pub fn tree_diff(a: &Tree, b: &Tree, mode: DiffMode) -> Tree {
    let mut out = Tree {
        files: leaf_diff(&a.files, &b.files, mode),
        ..Tree::default()
    };
    for (name, b_child) in &b.children {
        let child = match a.children.get(name) {
            Some(a_child) => tree_diff(a_child, b_child, mode),
            None => b_child.pruned(),
        };
        if !child.is_empty() {
            out.children.insert(name.clone(), child);
        }
    }
    out
}

/// The five change sets of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Records in the new index absent (exactly) from the old one
    pub new_files: Tree,
    /// Records in the old index absent (exactly) from the new one
    pub old_files: Tree,
    /// URLs that did not exist before
    pub added: Tree,
    /// URLs whose record changed
    pub updated: Tree,
    /// URLs that no longer exist (old records)
    pub deleted: Tree,
}

impl Classification {
    /// Everything in `new` is added.
    pub fn first_run(new: Tree) -> Self {
        let added = new.pruned();
        Self {
            new_files: added.clone(),
            added,
            ..Self::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.new_files.is_empty() || !self.old_files.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.file_count() + self.updated.file_count() + self.deleted.file_count()
    }
}

/// Sequential classification.
pub fn classify(old: Option<&Tree>, new: &Tree) -> Classification {
    let Some(old) = old else {
        return Classification::first_run(new.clone());
    };
    let new_files = tree_diff(old, new, DiffMode::Full);
    let old_files = tree_diff(new, old, DiffMode::Full);
    let added = tree_diff(&old_files, &new_files, DiffMode::UrlOnly);
    let deleted = tree_diff(&new_files, &old_files, DiffMode::UrlOnly);
    let updated = tree_diff(&added, &new_files, DiffMode::UrlOnly);
    Classification {
        new_files,
        old_files,
        added,
        updated,
        deleted,
    }
}

struct LeafDiffHandler {
    a: Arc<Tree>,
    b: Arc<Tree>,
    mode: DiffMode,
}

#[async_trait]
impl JobHandler for LeafDiffHandler {
    type Job = TreePath;
    type Output = (TreePath, Vec<FileEntry>);

    fn describe(&self, path: &TreePath) -> String {
        format!("/{}", path.join("/"))
    }

    async fn handle(&self, path: TreePath) -> Result<JobOutput<TreePath, Self::Output>> {
        let files = leaf_diff(self.a.files_at(&path), self.b.files_at(&path), self.mode);
        let mut output = JobOutput::empty();
        if !files.is_empty() {
            output.push_result((path, files));
        }
        Ok(output)
    }
}

/// Runs tree diffs on a worker pool, one job per file-bearing directory.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    pool: PoolConfig,
}

impl DiffEngine {
    pub fn new(pool: PoolConfig) -> Self {
        Self { pool }
    }

    /// Parallel [`tree_diff`]. Any job that does not finish fails the diff,
    /// since a partial difference would be silently wrong.
    pub async fn tree_diff(&self, a: &Arc<Tree>, b: &Arc<Tree>, mode: DiffMode) -> Result<Tree> {
        let pool = WorkerPool::new(
            LeafDiffHandler {
                a: Arc::clone(a),
                b: Arc::clone(b),
                mode,
            },
            self.pool.clone(),
        );

        let mut out = Tree::new();
        let report = pool
            .run(b.file_paths(), |(path, files)| out.insert_files(&path, files))
            .await?;

        if !report.completed || report.jobs_failed > 0 {
            return Err(AppError::crawl(
                "diff",
                format!(
                    "{} of {} director(ies) not compared",
                    report.jobs_failed,
                    report.jobs_failed + report.jobs_completed
                ),
            ));
        }
        Ok(out)
    }

    /// Parallel [`classify`].
    pub async fn classify(&self, old: Option<Tree>, new: Tree) -> Result<Classification> {
        let Some(old) = old else {
            return Ok(Classification::first_run(new));
        };
        let old = Arc::new(old);
        let new = Arc::new(new);

        let new_files = Arc::new(self.tree_diff(&old, &new, DiffMode::Full).await?);
        let old_files = Arc::new(self.tree_diff(&new, &old, DiffMode::Full).await?);
        let added = Arc::new(self.tree_diff(&old_files, &new_files, DiffMode::UrlOnly).await?);
        let deleted = self.tree_diff(&new_files, &old_files, DiffMode::UrlOnly).await?;
        let updated = self.tree_diff(&added, &new_files, DiffMode::UrlOnly).await?;

        Ok(Classification {
            new_files: unwrap_tree(new_files),
            old_files: unwrap_tree(old_files),
            added: unwrap_tree(added),
            updated,
            deleted,
        })
    }
}

fn unwrap_tree(tree: Arc<Tree>) -> Tree {
    Arc::try_unwrap(tree).unwrap_or_else(|shared| (*shared).clone())
}
