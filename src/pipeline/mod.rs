//! Pipeline entry points.
//!
//! - `run_mirror`: crawl the source, classify changes, download and prune
//! - `run_trim`: delete local files the persisted index does not know

pub mod diff;
pub mod filter;
pub mod index;
pub mod mirror;
pub mod pool;
pub mod trim;

pub use diff::{Classification, DiffEngine, DiffMode, classify, leaf_diff, tree_diff};
pub use filter::EntryFilter;
pub use index::{BuildReport, IndexBuilder};
pub use mirror::{MirrorOptions, MirrorReport, run_mirror};
pub use pool::{JobHandler, JobOutput, PoolConfig, PoolReport, WorkerPool};
pub use trim::{TrimOptions, TrimReport, remove_files, run_trim};
