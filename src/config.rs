// src/config.rs

//! Configuration loading utilities.
//!
//! Resolves which file to read and layers command-line overrides on top.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::Config;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "httpsync.toml";

/// Load configuration.
///
/// An explicit path must exist and parse. Without one, `httpsync.toml` in the
/// working directory is used if present, falling back to defaults if it
/// cannot be read.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::load(path);
    }
    let implicit = Path::new(DEFAULT_CONFIG_FILE);
    if implicit.exists() {
        Ok(Config::load_or_default(implicit))
    } else {
        Ok(Config::default())
    }
}

/// Where `--save` writes the effective configuration.
pub fn config_target(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Values given on the command line; `None`/empty leaves the file's value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source: Option<String>,
    pub distro: Option<String>,
    pub destination: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    /// Replaces the configured include list when non-empty
    pub include: Vec<String>,
    /// Replaces the configured exclude list when non-empty
    pub exclude: Vec<String>,
    pub rpc_host: Option<String>,
    pub rpc_port: Option<u16>,
    pub rpc_secret: Option<String>,
    /// Crawler worker count
    pub workers: Option<usize>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut Config) {
        let general = &mut config.general;
        if let Some(source) = self.source {
            general.source = source;
        }
        if let Some(distro) = self.distro {
            general.distro = distro;
        }
        if let Some(destination) = self.destination {
            general.destination = destination;
        }
        if let Some(cache) = self.cache {
            general.cache = cache;
        }
        if !self.include.is_empty() {
            general.include = self.include;
        }
        if !self.exclude.is_empty() {
            general.exclude = self.exclude;
        }

        if let Some(host) = self.rpc_host {
            config.aria2.host = host;
        }
        if let Some(port) = self.rpc_port {
            config.aria2.port = port;
        }
        if let Some(secret) = self.rpc_secret {
            config.aria2.secret = secret;
        }
        if let Some(workers) = self.workers {
            config.crawler.workers = workers;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_values() {
        let mut config = Config::default();
        config.general.source = "http://a/".to_string();
        config.general.exclude = vec!["debug".to_string()];

        ConfigOverrides {
            distro: Some("ubuntu".to_string()),
            include: vec![r"\.deb$".to_string()],
            rpc_port: Some(6801),
            workers: Some(2),
            ..ConfigOverrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.general.source, "http://a/");
        assert_eq!(config.general.distro, "ubuntu");
        assert_eq!(config.general.include, vec![r"\.deb$".to_string()]);
        assert_eq!(config.general.exclude, vec!["debug".to_string()]);
        assert_eq!(config.aria2.port, 6801);
        assert_eq!(config.crawler.workers, 2);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(load_config(Some(&tmp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_explicit_file_loads() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("httpsync.toml");
        std::fs::write(&path, "[general]\nsource = \"http://h/debian/\"\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.general.source, "http://h/debian/");
    }

    #[test]
    fn test_config_target_defaults_to_working_directory() {
        assert_eq!(config_target(None), PathBuf::from(DEFAULT_CONFIG_FILE));
        assert_eq!(
            config_target(Some(Path::new("/etc/httpsync.toml"))),
            PathBuf::from("/etc/httpsync.toml")
        );
    }
}
