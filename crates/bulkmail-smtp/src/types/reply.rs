//! Server replies and the codes the session waits for.

use crate::error::{Error, Result};

/// A complete, possibly multi-line, server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Code taken from the first line.
    pub code: ReplyCode,
    /// Text of every line, without code or separator.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// All lines joined with `\n`.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Passes the reply through if its code is exactly `expected`.
    ///
    /// Another code of the same class is still a mismatch: a 251 does not
    /// satisfy a wait for 250.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedReply`] carrying both codes and the text.
    pub fn expect(self, expected: ReplyCode) -> Result<Self> {
        if self.code != expected {
            return Err(Error::unexpected(expected, self.code, self.message_text()));
        }
        Ok(self)
    }
}

/// Three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// `220` greeting, also the go-ahead for STARTTLS.
    pub const SERVICE_READY: Self = Self(220);
    /// `221` answer to QUIT.
    pub const CLOSING: Self = Self(221);
    /// `235` AUTH accepted.
    pub const AUTH_SUCCEEDED: Self = Self(235);
    /// `250` command accepted.
    pub const OK: Self = Self(250);
    /// `334` AUTH prompt.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// `354` go ahead with message data.
    pub const START_DATA: Self = Self(354);
    /// `535` credentials rejected.
    pub const AUTH_FAILED: Self = Self(535);
    /// `550` mailbox unavailable.
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
    /// `554` transaction failed.
    pub const TRANSACTION_FAILED: Self = Self(554);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
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
    fn test_expect_exact_code() {
        let reply = Reply::new(ReplyCode::OK, vec!["2.1.0 Ok".to_string()]);
        assert_eq!(reply.expect(ReplyCode::OK).unwrap().code, ReplyCode::OK);
    }

    #[test]
    fn test_expect_rejects_same_class() {
        let reply = Reply::new(ReplyCode::new(251), vec!["will forward".to_string()]);
        let err = reply.expect(ReplyCode::OK).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedReply { expected, code, .. }
                if expected == ReplyCode::OK && code.as_u16() == 251
        ));
    }

    #[test]
    fn test_mismatch_carries_all_lines() {
        let reply = Reply::new(
            ReplyCode::TRANSACTION_FAILED,
            vec!["5.7.1 rejected".to_string(), "see policy".to_string()],
        );
        let err = reply.expect(ReplyCode::START_DATA).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected reply 354, got 554: 5.7.1 rejected\nsee policy"
        );
    }

    #[test]
    fn test_display_is_three_digits() {
        assert_eq!(ReplyCode::AUTH_SUCCEEDED.to_string(), "235");
        assert_eq!(ReplyCode::new(42).to_string(), "042");
    }
}
