//! Shared CSV plumbing for the recipient and link files.

use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord, Trim};

use crate::error::{Error, Result};

const CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Picks the delimiter that appears most often in the header line.
///
/// Falls back to `,` when the header holds none of the candidates, which is
/// the case for single-column files.
pub fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    CANDIDATES
        .iter()
        .map(|&d| (d, header.bytes().filter(|&b| b == d).count()))
        .filter(|&(_, count)| count > 0)
        .max_by_key(|&(_, count)| count)
        .map_or(b',', |(d, _)| d)
}

/// Reads `path` and returns a header-aware reader over its contents.
pub fn open(path: &Path) -> Result<Reader<std::io::Cursor<String>>> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let delimiter = sniff_delimiter(&content);

    Ok(ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(std::io::Cursor::new(content)))
}

/// Finds a column by name, ignoring case.
pub fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

/// Returns the trimmed, non-empty value at `index`.
pub fn field(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
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

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("email,name\na@b.co,A\n"), b',');
        assert_eq!(sniff_delimiter("email;name\na@b.co;A\n"), b';');
        assert_eq!(sniff_delimiter("email\tname\n"), b'\t');
        assert_eq!(sniff_delimiter("email|name|company\n"), b'|');
        assert_eq!(sniff_delimiter("email\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_field_skips_blanks() {
        let record = StringRecord::from(vec!["a@b.co", "  "]);
        assert_eq!(field(&record, Some(0)), Some("a@b.co"));
        assert_eq!(field(&record, Some(1)), None);
        assert_eq!(field(&record, Some(5)), None);
        assert_eq!(field(&record, None), None);
    }
}
