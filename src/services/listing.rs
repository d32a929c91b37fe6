// src/services/listing.rs

//! Directory listing parser.
//!
//! Understands the two autoindex formats found in front of package archives:
//! Apache's `mod_autoindex` table and NGINX's `<pre>` listing.

use chrono::{NaiveDate, NaiveTime};
use scraper::{ElementRef, Html, Node, Selector};

use crate::error::{AppError, Result};
use crate::models::{RawEntry, ServerKind};

/// Parse a listing page into raw records.
pub fn parse_listing(html: &str, kind: ServerKind) -> Result<Vec<RawEntry>> {
    let document = Html::parse_document(html);
    match kind {
        ServerKind::Apache => parse_apache(&document),
        ServerKind::Nginx => parse_nginx(&document),
        ServerKind::Auto => {
            if document.select(&parse_selector("table")?).next().is_some() {
                parse_apache(&document)
            } else {
                parse_nginx(&document)
            }
        }
    }
}

/// Apache: one `<tr>` per entry with icon, name, date, size, description.
fn parse_apache(document: &Html) -> Result<Vec<RawEntry>> {
    let row_sel = parse_selector("table tr")?;
    let cell_sel = parse_selector("td")?;
    let img_sel = parse_selector("img")?;
    let link_sel = parse_selector("a")?;

    let mut entries = Vec::new();
    for row in document.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        if cells.len() < 4 {
            continue;
        }

        let type_hint = cells[0]
            .select(&img_sel)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .unwrap_or_default();
        let href = cells[1]
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();

        entries.push(RawEntry {
            type_hint: type_hint.to_string(),
            href: href.to_string(),
            timestamp: cell_text(&cells[2]),
            size: cell_text(&cells[3]),
            description: cells.get(4).map(cell_text).unwrap_or_default(),
        });
    }
    Ok(entries)
}

/// NGINX: `<a href>` followed by a text run `DD-Mon-YYYY HH:MM SIZE`.
fn parse_nginx(document: &Html) -> Result<Vec<RawEntry>> {
    let pre_sel = parse_selector("pre")?;

    let mut entries = Vec::new();
    for pre in document.select(&pre_sel) {
        let mut current: Option<RawEntry> = None;
        for child in pre.children() {
            match child.value() {
                Node::Element(element) if element.name() == "a" => {
                    entries.extend(current.take());
                    let href = element.attr("href").unwrap_or_default();
                    current = Some(RawEntry {
                        type_hint: nginx_type_hint(href).to_string(),
                        href: href.to_string(),
                        ..RawEntry::default()
                    });
                }
                Node::Text(text) => {
                    if let Some(mut entry) = current.take() {
                        apply_nginx_trailer(&mut entry, text);
                        entries.push(entry);
                    }
                }
                _ => {}
            }
        }
        entries.extend(current.take());
    }
    Ok(entries)
}

/// NGINX has no icons; infer the hint from the href shape.
fn nginx_type_hint(href: &str) -> &'static str {
    if href.starts_with('/') {
        "[PARENTDIR]"
    } else if href.ends_with('/') {
        "[DIR]"
    } else {
        ""
    }
}

fn apply_nginx_trailer(entry: &mut RawEntry, trailer: &str) {
    let mut date = None;
    let mut time = None;
    for piece in trailer.split_whitespace() {
        if let Ok(parsed) = NaiveDate::parse_from_str(piece, "%d-%b-%Y") {
            date = Some(parsed);
        } else if let Ok(parsed) = NaiveTime::parse_from_str(piece, "%H:%M") {
            time = Some(parsed);
        }
        entry.size = piece.to_string();
    }

    entry.timestamp = match (date, time) {
        (Some(d), Some(t)) => format!("{} {}", d.format("%Y-%m-%d"), t.format("%H:%M")),
        (Some(d), None) => d.format("%Y-%m-%d").to_string(),
        _ => String::new(),
    };
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const APACHE: &str = r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 3.2 Final//EN">
<html><head><title>Index of /debian</title></head><body>
<h1>Index of /debian</h1>
<table>
<tr><th valign="top"><img src="/icons/blank.gif" alt="[ICO]"></th><th><a href="?C=N;O=D">Name</a></th><th><a href="?C=M;O=A">Last modified</a></th><th><a href="?C=S;O=A">Size</a></th><th><a href="?C=D;O=A">Description</a></th></tr>
<tr><th colspan="5"><hr></th></tr>
<tr><td valign="top"><img src="/icons/back.gif" alt="[PARENTDIR]"></td><td><a href="/">Parent Directory</a></td><td>&nbsp;</td><td align="right">  - </td><td>&nbsp;</td></tr>
<tr><td valign="top"><img src="/icons/folder.gif" alt="[DIR]"></td><td><a href="dists/">dists/</a></td><td align="right">2026-10-11 09:20  </td><td align="right">  - </td><td>&nbsp;</td></tr>
<tr><td valign="top"><img src="/icons/unknown.gif" alt="[   ]"></td><td><a href="ls-lR.gz">ls-lR.gz</a></td><td align="right">2026-10-18 20:52  </td><td align="right"> 19M</td><td>Full listing</td></tr>
<tr><th colspan="5"><hr></th></tr>
</table>
<address>Apache/2.4.62 (Debian) Server</address>
</body></html>"#;

    const NGINX: &str = r#"<html>
<head><title>Index of /ubuntu/</title></head>
<body>
<h1>Index of /ubuntu/</h1><hr><pre><a href="../">../</a>
<a href="dists/">dists/</a>                                             11-Oct-2026 09:20                   -
<a href="ls-lR.gz">ls-lR.gz</a>                                           18-Oct-2026 20:52            19514863
</pre><hr></body>
</html>"#;

    #[test]
    fn test_parse_apache_table() {
        let entries = parse_listing(APACHE, ServerKind::Apache).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].type_hint, "[PARENTDIR]");
        assert_eq!(entries[1].type_hint, "[DIR]");
        assert_eq!(entries[1].href, "dists/");
        assert_eq!(entries[1].size, "-");
        assert_eq!(entries[2].href, "ls-lR.gz");
        assert_eq!(entries[2].timestamp, "2026-10-18 20:52");
        assert_eq!(entries[2].size, "19M");
        assert_eq!(entries[2].description, "Full listing");
    }

    #[test]
    fn test_parse_nginx_pre() {
        let entries = parse_listing(NGINX, ServerKind::Nginx).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].href, "../");
        assert_eq!(entries[1].type_hint, "[DIR]");
        assert_eq!(entries[1].timestamp, "2026-10-11 09:20");
        assert_eq!(entries[1].size, "-");
        assert_eq!(entries[2].type_hint, "");
        assert_eq!(entries[2].size, "19514863");
        assert_eq!(entries[2].timestamp, "2026-10-18 20:52");
    }

    #[test]
    fn test_auto_detects_format() {
        let apache = parse_listing(APACHE, ServerKind::Auto).unwrap();
        let nginx = parse_listing(NGINX, ServerKind::Auto).unwrap();
        assert_eq!(apache[2].size, "19M");
        assert_eq!(nginx[2].size, "19514863");
    }

    #[test]
    fn test_page_without_listing_is_empty() {
        let entries = parse_listing("<html><body><p>nothing</p></body></html>", ServerKind::Auto)
            .unwrap();
        assert!(entries.is_empty());
    }
}
