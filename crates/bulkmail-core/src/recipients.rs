//! Recipient list loading and validation.

use std::path::Path;

use bulkmail_smtp::Address;
use tracing::{info, warn};

use crate::csv_file;
use crate::error::{Error, Result};

/// Name used when a row has no `name` value.
pub const DEFAULT_NAME: &str = "No name";

/// One campaign recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Validated address.
    pub email: Address,
    /// Display name used by templates.
    pub name: String,
}

/// Recipients that passed validation, in file order.
#[derive(Debug, Clone, Default)]
pub struct RecipientList {
    /// Valid recipients.
    pub recipients: Vec<Recipient>,
    /// Rows dropped for an invalid or missing address.
    pub skipped: usize,
}

impl RecipientList {
    /// Number of valid recipients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    /// Returns true if no row was valid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Returns true if `email` is a plausible `local@domain.tld` address.
#[must_use]
pub fn validate_email(email: &str) -> bool {
    bulkmail_smtp::is_valid_address(email)
}

/// Loads recipients from a CSV file with an `email` and optional `name` column.
///
/// The delimiter is detected from the header line. Rows with an invalid
/// address are skipped and counted.
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no `email` column.
pub fn load_recipients(path: impl AsRef<Path>) -> Result<RecipientList> {
    let path = path.as_ref();
    let mut reader = csv_file::open(path)?;

    let headers = reader.headers()?.clone();
    let email_col = csv_file::column(&headers, "email").ok_or_else(|| Error::MissingColumn {
        path: path.to_path_buf(),
        column: "email",
    })?;
    let name_col = csv_file::column(&headers, "name");

    let mut list = RecipientList::default();
    for (row, record) in reader.records().enumerate() {
        // Header is line 1.
        let line = row + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(line, "Unreadable row skipped: {e}");
                list.skipped += 1;
                continue;
            }
        };

        let raw = csv_file::field(&record, Some(email_col)).unwrap_or_default();
        let Ok(email) = Address::new(raw) else {
            warn!(line, "Invalid email skipped: {raw}");
            list.skipped += 1;
            continue;
        };

        let name = csv_file::field(&record, name_col).unwrap_or(DEFAULT_NAME);
        list.recipients.push(Recipient {
            email,
            name: name.to_string(),
        });
    }

    info!(
        path = %path.display(),
        skipped = list.skipped,
        "Loaded {} valid recipients",
        list.len()
    );
    Ok(list)
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
    fn test_validate_email() {
        assert!(validate_email("a@b.co"));
        assert!(validate_email("first.last+news@mail.example.org"));
        assert!(!validate_email("not-an-email"));
        assert!(!validate_email("a@b"));
        assert!(!validate_email("@b.com"));
    }

    #[test]
    fn test_load_skips_invalid_rows() {
        let file =
            csv("email,name\nalice@example.com,Alice\nnot-an-email,Bob\n  carol@example.org ,\n");

        let list = load_recipients(file.path()).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.skipped, 1);
        assert_eq!(list.recipients[0].email.as_str(), "alice@example.com");
        assert_eq!(list.recipients[0].name, "Alice");
        assert_eq!(list.recipients[1].email.as_str(), "carol@example.org");
        assert_eq!(list.recipients[1].name, DEFAULT_NAME);
    }

    #[test]
    fn test_load_sniffs_semicolons_and_header_case() {
        let file = csv("Name;Email\nDana;dana@example.com\n");

        let list = load_recipients(file.path()).unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.recipients[0].name, "Dana");
    }

    #[test]
    fn test_name_column_is_optional() {
        let file = csv("email\nerin@example.com\n");

        let list = load_recipients(file.path()).unwrap();
        assert_eq!(list.recipients[0].name, DEFAULT_NAME);
    }

    #[test]
    fn test_short_rows_are_skipped_not_fatal() {
        let file = csv("name,email\nFrank\ngrace@example.com,\nHeidi,heidi@example.com\n");

        let list = load_recipients(file.path()).unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list.skipped, 2);
    }

    #[test]
    fn test_missing_email_column_is_fatal() {
        let file = csv("address,name\na@b.co,A\n");

        let err = load_recipients(file.path()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column: "email", .. }));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();

        let err = load_recipients(dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn test_empty_file_has_no_email_column() {
        let file = csv("");

        assert!(load_recipients(file.path()).is_err());
    }
}
