//! Hierarchical index of a mirrored directory tree.
//!
//! A [`Tree`] node holds the files directly inside one directory plus its
//! subdirectories keyed by (decoded) name. Serialized, a node is a JSON object
//! whose reserved `"files"` key holds the file list and whose other keys are
//! child directories:
//!
//! ```text
//! {
//!   "files": [{ "url": ".../Release", "size": "12K" }],
//!   "dists": { "stable": { "files": [...] } },
//!   "pool": {}
//! }
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::FileEntry;

/// Key under which a serialized node stores its files.
pub const FILES_KEY: &str = "files";

/// Path of a node: directory names from the root.
pub type TreePath = Vec<String>;

/// One directory node and everything below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileEntry>,

    #[serde(flatten)]
    pub children: BTreeMap<String, Tree>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node with no files anywhere below it.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.children.values().all(Tree::is_empty)
    }

    /// Node at `path`, if present.
    pub fn node(&self, path: &[String]) -> Option<&Tree> {
        path.iter()
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    /// Files stored directly at `path` (empty if the node is absent).
    pub fn files_at(&self, path: &[String]) -> &[FileEntry] {
        self.node(path)
            .map(|node| node.files.as_slice())
            .unwrap_or(&[])
    }

    /// Node at `path`, creating missing intermediate nodes.
    pub fn node_mut(&mut self, path: &[String]) -> Result<&mut Tree> {
        let mut node = self;
        for segment in path {
            check_segment(segment)?;
            node = node.children.entry(segment.clone()).or_default();
        }
        Ok(node)
    }

    /// Store `files` at `path`. A node that already holds files is never
    /// overwritten: that would mean the same directory was reported twice.
    pub fn insert_files(&mut self, path: &[String], files: Vec<FileEntry>) -> Result<()> {
        let node = self.node_mut(path)?;
        if !node.files.is_empty() && !files.is_empty() {
            return Err(AppError::invariant(format!(
                "files for /{} reported more than once",
                path.join("/")
            )));
        }
        node.files.extend(files);
        Ok(())
    }

    /// Deep-merge `other` into `self`. Children accumulate; overlapping file
    /// lists are an invariant violation.
    pub fn merge(&mut self, other: Tree) -> Result<()> {
        self.merge_at(&mut Vec::new(), other)
    }

    fn merge_at(&mut self, path: &mut TreePath, other: Tree) -> Result<()> {
        if !other.files.is_empty() {
            if !self.files.is_empty() {
                return Err(AppError::invariant(format!(
                    "overlapping merge at /{}",
                    path.join("/")
                )));
            }
            self.files = other.files;
        }
        for (name, child) in other.children {
            check_segment(&name)?;
            path.push(name.clone());
            self.children.entry(name).or_default().merge_at(path, child)?;
            path.pop();
        }
        Ok(())
    }

    /// Paths of every node holding at least one file.
    pub fn file_paths(&self) -> Vec<TreePath> {
        let mut paths = Vec::new();
        self.collect_file_paths(&mut Vec::new(), &mut paths);
        paths
    }

    fn collect_file_paths(&self, path: &mut TreePath, out: &mut Vec<TreePath>) {
        if !self.files.is_empty() {
            out.push(path.clone());
        }
        for (name, child) in &self.children {
            path.push(name.clone());
            child.collect_file_paths(path, out);
            path.pop();
        }
    }

    /// Every file with the path of the directory holding it.
    pub fn walk_files(&self) -> Vec<(TreePath, &FileEntry)> {
        self.file_paths()
            .into_iter()
            .flat_map(|path| {
                let files = self.files_at(&path);
                files.iter().map(move |file| (path.clone(), file))
            })
            .collect()
    }

    /// Total number of files in the tree.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.children.values().map(Tree::file_count).sum::<usize>()
    }

    /// Number of directory nodes below this one.
    pub fn dir_count(&self) -> usize {
        self.children.len() + self.children.values().map(Tree::dir_count).sum::<usize>()
    }

    /// Copy of the tree with every file whose URL is in `urls` removed.
    /// Directory nodes are kept even when they end up empty.
    pub fn without_urls(&self, urls: &HashSet<&str>) -> Tree {
        Tree {
            files: self
                .files
                .iter()
                .filter(|file| !urls.contains(file.url.as_str()))
                .cloned()
                .collect(),
            children: self
                .children
                .iter()
                .map(|(name, child)| (name.clone(), child.without_urls(urls)))
                .collect(),
        }
    }

    /// Copy of the tree without nodes that hold no files below them.
    pub fn pruned(&self) -> Tree {
        Tree {
            files: self.files.clone(),
            children: self
                .children
                .iter()
                .filter(|(_, child)| !child.is_empty())
                .map(|(name, child)| (name.clone(), child.pruned()))
                .collect(),
        }
    }
}

fn check_segment(segment: &str) -> Result<()> {
    if segment == FILES_KEY {
        return Err(AppError::invariant(format!(
            "directory name '{FILES_KEY}' collides with the reserved file-list key"
        )));
    }
    Ok(())
}
