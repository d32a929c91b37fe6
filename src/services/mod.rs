//! Service layer: talking to the outside world.
//!
//! - Listing pages (`parse_listing`)
//! - Directory listers, remote and local (`HttpLister`, `LocalLister`)
//! - Download manager RPC (`Aria2Client`)

pub mod aria2;
pub mod lister;
pub mod listing;

pub use aria2::{Aria2Client, DownloadJob, DownloadManager, DownloadReport, download_jobs};
pub use lister::{
    DirLocation, DirectoryLister, HttpLister, LocalLister, Source, directory_url, make_lister,
    source_root_url,
};
pub use listing::parse_listing;
