//! Persistence of the latest index between runs.
//!
//! One index is kept per source/distro pair, overwritten after every
//! complete crawl:
//!
//! ```text
//! <cache>/
//! └── deb.example.org_debian_debian_index.json
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Tree;

pub use local::LocalIndexStore;

/// Backend holding the previous run's index.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Previous index, or `None` on a first run. An unreadable index is
    /// treated as absent.
    async fn load(&self) -> Result<Option<Tree>>;

    /// Replace the stored index.
    async fn save(&self, tree: &Tree) -> Result<()>;

    /// Human-readable location for log lines.
    fn location(&self) -> String;
}
