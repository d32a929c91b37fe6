//! Directory listing records and their normalized form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::{decode_percent, join_url};

/// Listing grammar spoken by the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// Apache `mod_autoindex` table
    Apache,
    /// NGINX `autoindex` preformatted text
    Nginx,
    /// Not known yet, guess from the markup
    #[default]
    Auto,
}

impl ServerKind {
    /// Classify a `Server` response header value.
    pub fn from_header(value: &str) -> Self {
        let value = value.to_ascii_lowercase();
        if value.contains("apache") {
            ServerKind::Apache
        } else if value.contains("nginx") {
            ServerKind::Nginx
        } else {
            ServerKind::Auto
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerKind::Apache => write!(f, "apache"),
            ServerKind::Nginx => write!(f, "nginx"),
            ServerKind::Auto => write!(f, "auto"),
        }
    }
}

/// One row of a directory listing, as scraped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Icon alt text or label, e.g. `[DIR]` or `[PARENTDIR]`
    pub type_hint: String,
    pub href: String,
    pub timestamp: String,
    pub size: String,
    pub description: String,
}

/// A file discovered in the mirrored tree.
///
/// Two records with the same `url` but a different size or timestamp are
/// distinct records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    pub url: String,
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl FileEntry {
    pub fn new(url: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size: size.into(),
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// A usable listing entry after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    File(FileEntry),
    /// A subdirectory: decoded segment name and its URL (with trailing slash).
    Directory { name: String, url: String },
}

/// Convert a raw listing record into a [`ListingEntry`].
///
/// Returns `None` for parent-directory links, hrefs that would leave the
/// directory (absolute paths, full URLs, `..`), query/fragment links and
/// records missing an href or size.
pub fn normalize_entry(parent_url: &str, raw: &RawEntry) -> Option<ListingEntry> {
    let href = raw.href.trim();
    let size = raw.size.trim();
    if href.is_empty() || size.is_empty() {
        return None;
    }

    let hint = hint_label(&raw.type_hint);
    if hint == "PARENTDIR" || escapes_parent(href) {
        return None;
    }

    let name = decode_percent(href.trim_end_matches('/'));
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return None;
    }

    let url = join_url(parent_url, href);
    if hint == "DIR" {
        let url = if url.ends_with('/') { url } else { format!("{url}/") };
        return Some(ListingEntry::Directory { name, url });
    }

    let timestamp = Some(raw.timestamp.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Some(ListingEntry::File(FileEntry {
        url,
        size: size.to_string(),
        timestamp,
    }))
}

/// Upper-cased type hint without surrounding brackets.
fn hint_label(hint: &str) -> String {
    hint.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .to_ascii_uppercase()
}

fn escapes_parent(href: &str) -> bool {
    href.starts_with('/')
        || href.starts_with('?')
        || href.starts_with('#')
        || href.starts_with("../")
        || href == ".."
        || href.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(hint: &str, href: &str, size: &str) -> RawEntry {
        RawEntry {
            type_hint: hint.to_string(),
            href: href.to_string(),
            timestamp: "2026-10-19 09:21".to_string(),
            size: size.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_file_entry_joined_with_one_slash() {
        let with_slash = normalize_entry("http://h/debian/", &raw("[   ]", "Release", "12K"));
        let without = normalize_entry("http://h/debian", &raw("[   ]", "Release", "12K"));
        let expected = ListingEntry::File(
            FileEntry::new("http://h/debian/Release", "12K").with_timestamp("2026-10-19 09:21"),
        );
        assert_eq!(with_slash, Some(expected.clone()));
        assert_eq!(without, Some(expected));
    }

    #[test]
    fn test_directory_detected_from_hint() {
        let entry = normalize_entry("http://h/debian/", &raw("[DIR]", "pool/", "-"));
        assert_eq!(
            entry,
            Some(ListingEntry::Directory {
                name: "pool".to_string(),
                url: "http://h/debian/pool/".to_string(),
            })
        );
        let nginx = normalize_entry("http://h/debian/", &raw("DIR", "dists/", "-"));
        assert!(matches!(nginx, Some(ListingEntry::Directory { .. })));
    }

    #[test]
    fn test_parent_and_absolute_links_discarded() {
        assert_eq!(normalize_entry("http://h/a/", &raw("[PARENTDIR]", "/", "-")), None);
        assert_eq!(normalize_entry("http://h/a/", &raw("[DIR]", "/a/", "-")), None);
        assert_eq!(normalize_entry("http://h/a/", &raw("[DIR]", "../", "-")), None);
        assert_eq!(normalize_entry("http://h/a/", &raw("", "http://x/y", "1")), None);
        assert_eq!(normalize_entry("http://h/a/", &raw("", "?C=N;O=D", "1")), None);
    }

    #[test]
    fn test_missing_fields_skipped() {
        assert_eq!(normalize_entry("http://h/", &raw("", "", "10")), None);
        assert_eq!(normalize_entry("http://h/", &raw("", "a.txt", "  ")), None);
    }

    #[test]
    fn test_encoded_directory_name_decoded() {
        let entry = normalize_entry("http://h/pool/", &raw("[DIR]", "libc%2B%2B/", "-"));
        match entry {
            Some(ListingEntry::Directory { name, url }) => {
                assert_eq!(name, "libc++");
                assert_eq!(url, "http://h/pool/libc%2B%2B/");
            }
            other => panic!("unexpected entry {other:?}"),
        }
        assert_eq!(normalize_entry("http://h/", &raw("[DIR]", "a%2Fb/", "-")), None);
    }

    #[test]
    fn test_server_kind_from_header() {
        assert_eq!(ServerKind::from_header("Apache/2.4.62 (Debian)"), ServerKind::Apache);
        assert_eq!(ServerKind::from_header("nginx/1.26.0"), ServerKind::Nginx);
        assert_eq!(ServerKind::from_header("cloudflare"), ServerKind::Auto);
    }
}
