//! Campaign links and click tracking.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::csv_file;
use crate::error::{Error, Result};

/// A link offered to every recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    /// Target, already rewritten through the tracker when tracking is on.
    pub url: String,
    /// Anchor text, possibly empty.
    pub text: String,
}

/// Rewrites `url` to go through the redirect endpoint on `domain`.
///
/// The target url is appended verbatim.
#[must_use]
pub fn tracked_url(domain: &str, url: &str) -> String {
    format!("http://{domain}/redirect?to={url}")
}

/// Loads links from a CSV file with a `url` and optional `text` column.
///
/// With a tracking domain every url is rewritten by [`tracked_url`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no `url` column.
pub fn load_links(path: impl AsRef<Path>, tracking: Option<&str>) -> Result<Vec<Link>> {
    let path = path.as_ref();
    let mut reader = csv_file::open(path)?;

    let headers = reader.headers()?.clone();
    let url_col = csv_file::column(&headers, "url").ok_or_else(|| Error::MissingColumn {
        path: path.to_path_buf(),
        column: "url",
    })?;
    let text_col = csv_file::column(&headers, "text");

    let mut links = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let line = row + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), line, "Unreadable link row skipped: {e}");
                continue;
            }
        };
        let Some(url) = csv_file::field(&record, Some(url_col)) else {
            warn!(path = %path.display(), line, "Link row without url skipped");
            continue;
        };

        let url = tracking.map_or_else(|| url.to_string(), |domain| tracked_url(domain, url));
        let text = csv_file::field(&record, text_col).unwrap_or_default();
        links.push(Link {
            url,
            text: text.to_string(),
        });
    }

    debug!(
        count = links.len(),
        tracked = tracking.is_some(),
        "links loaded"
    );
    Ok(links)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_without_tracking() {
        let file = csv("url,text\nhttps://example.com/sale,Big sale\nhttps://example.com/faq,\n");

        let links = load_links(file.path(), None).unwrap();

        assert_eq!(
            links,
            vec![
                Link {
                    url: "https://example.com/sale".into(),
                    text: "Big sale".into(),
                },
                Link {
                    url: "https://example.com/faq".into(),
                    text: String::new(),
                },
            ]
        );
    }

    #[test]
    fn test_tracking_rewrites_urls_verbatim() {
        let file = csv("url\nhttps://example.com/a?b=c\n");

        let links = load_links(file.path(), Some("track.example.com")).unwrap();

        assert_eq!(
            links[0].url,
            "http://track.example.com/redirect?to=https://example.com/a?b=c"
        );
    }

    #[test]
    fn test_bad_rows_are_skipped_not_fatal() {
        let file = csv("text,url\nonly text\n,\nDocs,https://example.com/docs\n");

        let links = load_links(file.path(), None).unwrap();

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/docs");
        assert_eq!(links[0].text, "Docs");
    }

    #[test]
    fn test_missing_url_column() {
        let file = csv("href,text\nx,y\n");

        let err = load_links(file.path(), None).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column: "url", .. }));
    }
}
