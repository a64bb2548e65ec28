//! Commands the session sends.

mod data;

pub use data::encode_data;

use crate::types::{Address, AuthMechanism};

/// A client command, one line on the wire.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// `EHLO <name>`
    Ehlo {
        /// Name the client introduces itself with.
        hostname: String,
    },
    /// `STARTTLS`
    StartTls,
    /// `AUTH <mechanism>`
    Auth {
        /// Mechanism to start.
        mechanism: AuthMechanism,
    },
    /// Base64 line sent in answer to a 334 prompt.
    AuthResponse(String),
    /// `MAIL FROM:<addr>`
    MailFrom {
        /// Envelope sender.
        from: Address,
    },
    /// `RCPT TO:<addr>`
    RcptTo {
        /// Envelope recipient.
        to: Address,
    },
    /// `DATA`
    Data,
    /// `QUIT`
    Quit,
}

impl Command {
    /// The command line, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth { mechanism } => format!("AUTH {}", mechanism.as_str()),
            Self::AuthResponse(response) => response.clone(),
            Self::MailFrom { from } => format!("MAIL FROM:<{}>", from.as_str()),
            Self::RcptTo { to } => format!("RCPT TO:<{}>", to.as_str()),
            Self::Data => "DATA".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Short name used in logs and timeout errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::AuthResponse(_) => "AUTH response",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Quit => "QUIT",
        }
    }
}

// Credentials must never reach the logs, so Debug is written by hand.
impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthResponse(_) => f.write_str("<credentials>"),
            _ => {
                let line = self.serialize();
                f.write_str(String::from_utf8_lossy(&line).trim_end())
            }
        }
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
    fn test_ehlo_line() {
        let cmd = Command::Ehlo {
            hostname: "sender.example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"EHLO sender.example.com\r\n");
    }

    #[test]
    fn test_auth_login() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
        };
        assert_eq!(cmd.serialize(), b"AUTH LOGIN\r\n");
    }

    #[test]
    fn test_auth_response_is_raw_line() {
        let cmd = Command::AuthResponse("dXNlcg==".to_string());
        assert_eq!(cmd.serialize(), b"dXNlcg==\r\n");
    }

    #[test]
    fn test_auth_response_debug_is_redacted() {
        let cmd = Command::AuthResponse("c2VjcmV0".to_string());
        let shown = format!("{cmd:?}");
        assert_eq!(shown, "<credentials>");
        assert!(!shown.contains("c2VjcmV0"));
    }

    #[test]
    fn test_envelope_commands() {
        let from = Command::MailFrom {
            from: Address::new("news@example.com").unwrap(),
        };
        let to = Command::RcptTo {
            to: Address::new("reader@example.org").unwrap(),
        };
        assert_eq!(from.serialize(), b"MAIL FROM:<news@example.com>\r\n");
        assert_eq!(to.serialize(), b"RCPT TO:<reader@example.org>\r\n");
        assert_eq!(format!("{to:?}"), "RCPT TO:<reader@example.org>");
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }
}
