// src/models/mod.rs

//! Domain models for the mirror application.
//!
//! This module contains the listing records, the directory tree index and
//! the configuration structures.

mod config;
mod entry;
mod tree;

// Re-export all public types
pub use config::{Aria2Config, Config, CrawlerConfig, DiffConfig, GeneralConfig, PoolSettings};
pub use entry::{FileEntry, ListingEntry, RawEntry, ServerKind, normalize_entry};
pub use tree::{FILES_KEY, Tree, TreePath};
