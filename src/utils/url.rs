// src/utils/url.rs

//! URL manipulation utilities.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Join a directory URL and a relative href with exactly one separator.
///
/// # Examples
/// ```
/// use httpsync::utils::url::join_url;
///
/// assert_eq!(
///     join_url("https://example.com/debian/", "pool/"),
///     "https://example.com/debian/pool/"
/// );
/// assert_eq!(
///     join_url("https://example.com/debian", "/Release"),
///     "https://example.com/debian/Release"
/// );
/// ```
pub fn join_url(parent: &str, href: &str) -> String {
    format!(
        "{}/{}",
        parent.trim_end_matches('/'),
        href.trim_start_matches('/')
    )
}

/// Append a trailing slash unless one is already present.
pub fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

/// Whether a source location is a remote HTTP(S) URL rather than a local path.
pub fn is_remote(source: &str) -> bool {
    let lower = source.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Decode `%XX` escapes. Malformed escapes are kept literally.
pub fn decode_percent(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Bytes left as-is in an encoded path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'+');

/// Percent-encode a single path segment (file or directory name).
pub fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, SEGMENT).to_string()
}

/// Last non-empty path segment of a URL, percent-decoded.
pub fn file_name(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(decode_percent)
}

/// Filesystem-safe name of the persisted index for a source/distro pair.
pub fn index_file_name(source: &str, distro: &str) -> String {
    let stem: String = source
        .trim()
        .trim_end_matches('/')
        .split("://")
        .last()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{stem}_{distro}_index.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_single_separator() {
        assert_eq!(join_url("http://h/a", "b.txt"), "http://h/a/b.txt");
        assert_eq!(join_url("http://h/a/", "b.txt"), "http://h/a/b.txt");
        assert_eq!(join_url("http://h/a//", "/b/"), "http://h/a/b/");
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://deb.debian.org/debian"));
        assert!(is_remote("HTTP://mirror/"));
        assert!(!is_remote("/srv/mirror"));
        assert!(!is_remote("file:///srv/mirror"));
    }

    #[test]
    fn test_decode_percent() {
        assert_eq!(decode_percent("libc%2B%2B"), "libc++");
        assert_eq!(decode_percent("a%20b"), "a b");
        assert_eq!(decode_percent("100%"), "100%");
        assert_eq!(decode_percent("%zz"), "%zz");
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("a b.deb"), "a%20b.deb");
        assert_eq!(encode_segment("g++_1.0"), "g++_1.0");
        assert_eq!(decode_percent(&encode_segment("ünï code")), "ünï code");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            file_name("http://h/pool/main/a%20b.deb"),
            Some("a b.deb".to_string())
        );
        assert_eq!(file_name("http://h/dists/"), Some("dists".to_string()));
    }

    #[test]
    fn test_index_file_name() {
        assert_eq!(
            index_file_name("http://deb.example.org/debian/", "debian"),
            "deb.example.org_debian_debian_index.json"
        );
    }
}
