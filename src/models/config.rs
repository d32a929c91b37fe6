//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::ServerKind;
use crate::pipeline::filter::EntryFilter;
use crate::utils::url::{index_file_name, is_remote};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Source, destination and filters
    #[serde(default)]
    pub general: GeneralConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Diff worker settings
    #[serde(default)]
    pub diff: DiffConfig,

    /// Worker pool termination settings
    #[serde(default)]
    pub pool: PoolSettings,

    /// Download manager RPC settings
    #[serde(default)]
    pub aria2: Aria2Config,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Write the configuration back to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let source = self.general.source.trim();
        if source.is_empty() {
            return Err(AppError::validation("general.source is empty"));
        }
        if is_remote(source) {
            url::Url::parse(source)?;
        }
        if self.general.distro.trim().is_empty() {
            return Err(AppError::validation("general.distro is empty"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.workers == 0 {
            return Err(AppError::validation("crawler.workers must be > 0"));
        }
        if self.diff.workers == 0 {
            return Err(AppError::validation("diff.workers must be > 0"));
        }
        if self.pool.quiescence_threshold == 0 {
            return Err(AppError::validation(
                "pool.quiescence_threshold must be > 0",
            ));
        }
        if self.pool.poll_interval_ms == 0 {
            return Err(AppError::validation("pool.poll_interval_ms must be > 0"));
        }
        self.filter()?;
        Ok(())
    }

    /// Compile the include/exclude patterns.
    pub fn filter(&self) -> Result<EntryFilter> {
        EntryFilter::new(
            self.general.include.as_slice(),
            self.general.exclude.as_slice(),
        )
    }

    /// Local directory the source is mirrored into.
    pub fn mirror_root(&self) -> PathBuf {
        self.general.destination.join(&self.general.distro)
    }

    /// Location of the persisted index for this source.
    pub fn index_path(&self) -> PathBuf {
        self.general
            .cache
            .join(index_file_name(&self.general.source, &self.general.distro))
    }
}

/// Source, destination and filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Repository root: an http(s) URL or a local directory
    #[serde(default)]
    pub source: String,

    /// Name of the mirror directory under `destination`
    #[serde(default = "defaults::distro")]
    pub distro: String,

    /// Where mirrored files are stored
    #[serde(default = "defaults::destination")]
    pub destination: PathBuf,

    /// Where the latest index is persisted between runs
    #[serde(default = "defaults::cache")]
    pub cache: PathBuf,

    /// URL patterns an entry must match (any of); empty accepts all
    #[serde(default)]
    pub include: Vec<String>,

    /// URL patterns that reject an entry
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Remove files deleted upstream from the destination
    #[serde(default = "defaults::delete_removed")]
    pub delete_removed: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            distro: defaults::distro(),
            destination: defaults::destination(),
            cache: defaults::cache(),
            include: Vec::new(),
            exclude: Vec::new(),
            delete_removed: defaults::delete_removed(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Concurrent directory listings
    #[serde(default = "defaults::crawl_workers")]
    pub workers: usize,

    /// Listing grammar; `auto` uses the `Server` header
    #[serde(default)]
    pub server: ServerKind,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            workers: defaults::crawl_workers(),
            server: ServerKind::Auto,
        }
    }
}

/// Diff engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Concurrent per-directory diffs
    #[serde(default = "defaults::diff_workers")]
    pub workers: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            workers: defaults::diff_workers(),
        }
    }
}

/// When a worker pool counts as finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Consecutive empty-and-idle observations required to stop
    #[serde(default = "defaults::quiescence_threshold")]
    pub quiescence_threshold: u32,

    /// Interval between observations in milliseconds
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Observations after which the pool is force-terminated (0 = never)
    #[serde(default = "defaults::max_observations")]
    pub max_observations: u64,
}

impl PoolSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn observation_limit(&self) -> Option<u64> {
        (self.max_observations > 0).then_some(self.max_observations)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            quiescence_threshold: defaults::quiescence_threshold(),
            poll_interval_ms: defaults::poll_interval(),
            max_observations: defaults::max_observations(),
        }
    }
}

/// aria2 JSON-RPC settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aria2Config {
    #[serde(default = "defaults::rpc_host")]
    pub host: String,

    #[serde(default = "defaults::rpc_port")]
    pub port: u16,

    /// RPC secret token (empty = none)
    #[serde(default)]
    pub secret: String,

    /// Status polling interval in milliseconds
    #[serde(default = "defaults::rpc_poll_interval")]
    pub poll_interval_ms: u64,

    /// Resubmissions allowed for a failed download
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Concurrent `addUri` submissions
    #[serde(default = "defaults::max_concurrent_submits")]
    pub max_concurrent_submits: usize,
}

impl Aria2Config {
    /// JSON-RPC endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/jsonrpc", self.host.trim_end_matches('/'), self.port)
    }
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            host: defaults::rpc_host(),
            port: defaults::rpc_port(),
            secret: String::new(),
            poll_interval_ms: defaults::rpc_poll_interval(),
            max_retries: defaults::max_retries(),
            max_concurrent_submits: defaults::max_concurrent_submits(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    fn home() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    // General defaults
    pub fn distro() -> String {
        "debian".into()
    }
    pub fn destination() -> PathBuf {
        home().join("httpsync")
    }
    pub fn cache() -> PathBuf {
        home().join("httpsync_cache")
    }
    pub fn delete_removed() -> bool {
        true
    }

    // Crawler defaults
    pub fn user_agent() -> String {
        concat!("httpsync/", env!("CARGO_PKG_VERSION")).into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn crawl_workers() -> usize {
        16
    }

    // Diff defaults
    pub fn diff_workers() -> usize {
        64
    }

    // Pool defaults
    pub fn quiescence_threshold() -> u32 {
        4
    }
    pub fn poll_interval() -> u64 {
        25
    }
    pub fn max_observations() -> u64 {
        // ten hours at the default interval
        1_440_000
    }

    // aria2 defaults
    pub fn rpc_host() -> String {
        "http://localhost".into()
    }
    pub fn rpc_port() -> u16 {
        6800
    }
    pub fn rpc_poll_interval() -> u64 {
        1000
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn max_concurrent_submits() -> usize {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.general.source = "http://deb.example.org/debian/".to_string();
        config
    }

    #[test]
    fn validate_rejects_missing_source() {
        assert!(Config::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = valid_config();
        config.crawler.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let mut config = valid_config();
        config.general.include = vec!["(unclosed".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [general]
            source = "https://mirror.example.org/ubuntu/"
            include = ['(/|\.deb)$']

            [crawler]
            server = "nginx"
            "#,
        )
        .unwrap();
        assert_eq!(config.general.distro, "debian");
        assert_eq!(config.crawler.server, ServerKind::Nginx);
        assert_eq!(config.crawler.workers, 16);
        assert_eq!(config.pool.quiescence_threshold, 4);
        assert_eq!(config.aria2.endpoint(), "http://localhost:6800/jsonrpc");
    }

    #[test]
    fn save_then_load_keeps_values() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("conf/httpsync.toml");
        let mut config = valid_config();
        config.general.exclude = vec!["debug".to_string()];
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.general.exclude, vec!["debug".to_string()]);
        assert_eq!(loaded.general.source, config.general.source);
    }

    #[test]
    fn index_path_lives_in_cache() {
        let mut config = valid_config();
        config.general.cache = PathBuf::from("/var/cache/httpsync");
        assert_eq!(
            config.index_path(),
            PathBuf::from("/var/cache/httpsync/deb.example.org_debian_debian_index.json")
        );
    }
}
