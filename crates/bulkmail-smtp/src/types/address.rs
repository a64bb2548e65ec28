//! Email address types.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static ADDRESS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9.+_-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

/// Returns true if `addr` looks like `local@domain.tld`.
///
/// The local part allows letters, digits and `.+_-`; the domain must end in
/// an alphabetic label of at least two characters.
#[must_use]
pub fn is_valid_address(addr: &str) -> bool {
    ADDRESS_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(addr))
}

/// Email address for the SMTP envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is invalid.
    pub fn new(addr: impl AsRef<str>) -> Result<Self> {
        let addr = addr.as_ref().trim();
        if is_valid_address(addr) {
            Ok(Self(addr.to_string()))
        } else {
            Err(Error::InvalidAddress(addr.to_string()))
        }
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the part after `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
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
    fn test_valid_address() {
        let addr = Address::new("a@b.co").unwrap();
        assert_eq!(addr.as_str(), "a@b.co");
        assert!(is_valid_address("first.last+tag@mail.example.com"));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(!is_valid_address("not-an-email"));
        assert!(!is_valid_address("a@b"));
        assert!(!is_valid_address("@b.com"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("a@b.c"));
        assert!(!is_valid_address("a b@example.com"));
    }

    #[test]
    fn test_new_trims_and_rejects() {
        let trimmed = Address::new("  user@example.com\t").unwrap();
        assert_eq!(trimmed.as_str(), "user@example.com");
        assert!(matches!(Address::new("a@b"), Err(Error::InvalidAddress(a)) if a == "a@b"));
    }

    #[test]
    fn test_domain() {
        let addr: Address = "news@example.org".parse().unwrap();
        assert_eq!(addr.domain(), "example.org");
    }
}
