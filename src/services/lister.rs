// src/services/lister.rs

//! Directory listers: where listing records come from.
//!
//! [`HttpLister`] fetches and parses autoindex pages; [`LocalLister`] reads a
//! directory on disk and renders the same records, so a local tree can be
//! indexed and diffed exactly like a remote one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use reqwest::header::{CONTENT_TYPE, SERVER};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlerConfig, RawEntry, ServerKind, TreePath};
use crate::services::listing::parse_listing;
use crate::utils::http::create_client;
use crate::utils::url::{encode_segment, is_remote, with_trailing_slash};

/// A directory to list: its URL and its path in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirLocation {
    pub url: String,
    pub path: TreePath,
}

impl DirLocation {
    pub fn root(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: Vec::new(),
        }
    }

    /// Location of the subdirectory `name` reachable at `url`.
    pub fn child(&self, name: impl Into<String>, url: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self {
            url: url.into(),
            path,
        }
    }
}

/// Produces the raw records of one directory.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    async fn list(&self, dir: &DirLocation) -> Result<Vec<RawEntry>>;
}

/// Lists directories served over HTTP(S).
pub struct HttpLister {
    client: reqwest::Client,
    server: ServerKind,
}

impl HttpLister {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self::with_client(create_client(config)?, config.server))
    }

    pub fn with_client(client: reqwest::Client, server: ServerKind) -> Self {
        Self { client, server }
    }
}

#[async_trait]
impl DirectoryLister for HttpLister {
    async fn list(&self, dir: &DirLocation) -> Result<Vec<RawEntry>> {
        let response = self
            .client
            .get(&dir.url)
            .send()
            .await?
            .error_for_status()?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.starts_with("text/html") {
            log::debug!("{} is not a listing ({})", dir.url, content_type);
            return Ok(Vec::new());
        }

        let kind = match self.server {
            ServerKind::Auto => headers
                .get(SERVER)
                .and_then(|v| v.to_str().ok())
                .map(ServerKind::from_header)
                .unwrap_or_default(),
            forced => forced,
        };

        let body = response.text().await?;
        parse_listing(&body, kind)
    }
}

/// Lists directories on the local filesystem.
///
/// Symbolic links are skipped. Directory sizes render as `-`, file sizes as
/// a byte count and modification times as `YYYY-MM-DD HH:MM`.
pub struct LocalLister {
    root: PathBuf,
}

impl LocalLister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &[String]) -> PathBuf {
        path.iter().fold(self.root.clone(), |dir, segment| dir.join(segment))
    }
}

#[async_trait]
impl DirectoryLister for LocalLister {
    async fn list(&self, dir: &DirLocation) -> Result<Vec<RawEntry>> {
        let dir_path = self.resolve(&dir.path);
        let mut reader = tokio::fs::read_dir(&dir_path)
            .await
            .map_err(|e| AppError::listing(dir_path.display().to_string(), e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = entry.metadata().await?;
            let timestamp = metadata
                .modified()
                .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();

            if file_type.is_dir() {
                entries.push(RawEntry {
                    type_hint: "[DIR]".to_string(),
                    href: format!("{}/", encode_segment(&name)),
                    timestamp,
                    size: "-".to_string(),
                    description: String::new(),
                });
            } else if file_type.is_file() {
                entries.push(RawEntry {
                    type_hint: "[   ]".to_string(),
                    href: encode_segment(&name),
                    timestamp,
                    size: metadata.len().to_string(),
                    description: String::new(),
                });
            }
        }

        entries.sort_by(|a, b| a.href.cmp(&b.href));
        Ok(entries)
    }
}

/// A configured source: its lister and the URL of its root directory.
pub struct Source {
    pub lister: Arc<dyn DirectoryLister>,
    pub root_url: String,
}

/// Build the lister for `general.source`.
///
/// Remote sources are listed over HTTP. Anything else is taken as a local
/// directory, addressed by a `file://` URL.
pub fn make_lister(config: &Config) -> Result<Source> {
    let source = config.general.source.trim();
    let root_url = source_root_url(config)?;
    if is_remote(source) {
        return Ok(Source {
            lister: Arc::new(HttpLister::new(&config.crawler)?),
            root_url,
        });
    }
    Ok(Source {
        lister: Arc::new(LocalLister::new(local_source(source)?)),
        root_url,
    })
}

/// URL of the source's root directory, with trailing slash.
pub fn source_root_url(config: &Config) -> Result<String> {
    let source = config.general.source.trim();
    if is_remote(source) {
        Ok(with_trailing_slash(source))
    } else {
        directory_url(&local_source(source)?)
    }
}

fn local_source(source: &str) -> Result<PathBuf> {
    std::fs::canonicalize(source).map_err(|e| AppError::config(format!("source {source}: {e}")))
}

/// `file://` URL of a local directory, with trailing slash.
pub fn directory_url(dir: &Path) -> Result<String> {
    Url::from_directory_path(dir)
        .map(|url| url.to_string())
        .map_err(|_| AppError::config(format!("cannot address {} as a URL", dir.display())))
}
