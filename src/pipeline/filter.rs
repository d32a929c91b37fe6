//! Include/exclude filtering of entry URLs.
//!
//! The filter is applied to files and directories alike; a rejected
//! directory is never listed, which prunes the whole subtree.

use regex::RegexSet;

use crate::error::Result;

/// Compiled include/exclude pattern sets.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    include: RegexSet,
    exclude: RegexSet,
}

impl EntryFilter {
    /// Compile the pattern lists. Fails on the first invalid pattern.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: RegexSet::new(include.iter().map(AsRef::as_ref))?,
            exclude: RegexSet::new(exclude.iter().map(AsRef::as_ref))?,
        })
    }

    /// A filter that accepts every URL.
    pub fn accept_all() -> Self {
        Self {
            include: RegexSet::empty(),
            exclude: RegexSet::empty(),
        }
    }

    pub fn accepts(&self, url: &str) -> bool {
        accept(url, &self.include, &self.exclude)
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

/// Decide whether `url` passes.
///
/// A non-empty include set must match; a matching exclude pattern always
/// rejects.
pub fn accept(url: &str, include: &RegexSet, exclude: &RegexSet) -> bool {
    if !include.is_empty() && !include.is_match(url) {
        return false;
    }
    if !exclude.is_empty() && exclude.is_match(url) {
        return false;
    }
    true
}
