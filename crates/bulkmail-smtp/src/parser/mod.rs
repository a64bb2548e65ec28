//! SMTP reply parser.
//!
//! Replies are one or more lines of `NNN<sep>text`, where `<sep>` is `-` on
//! continuation lines and a space (or nothing) on the final line:
//!
//! ```text
//! 250-relay.example.com
//! 250-STARTTLS
//! 250 AUTH LOGIN PLAIN
//! ```

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// One parsed reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// Three-digit code.
    pub code: ReplyCode,
    /// True if more lines of the same reply follow.
    pub more: bool,
    /// Text after the separator.
    pub text: String,
}

/// Parses a single reply line (without its line ending).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line does not start with three digits
/// followed by `-`, a space, or end of line.
pub fn parse_line(line: &str) -> Result<ReplyLine> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::Protocol(format!("Malformed reply line: {line:?}")));
    }

    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("Invalid reply code: {line:?}")))?;

    let (more, text) = match bytes.get(3) {
        None => (false, ""),
        Some(b' ') => (false, &line[4..]),
        Some(b'-') => (true, &line[4..]),
        Some(_) => return Err(Error::Protocol(format!("Malformed reply line: {line:?}"))),
    };

    Ok(ReplyLine {
        code: ReplyCode::new(code),
        more,
        text: text.to_string(),
    })
}

/// Builds a reply from its parsed lines.
///
/// The reply takes the code of the first line; codes on continuation lines
/// are not checked.
///
/// # Errors
///
/// Returns an error if `lines` is empty.
pub fn parse_reply(lines: Vec<ReplyLine>) -> Result<Reply> {
    let code = lines
        .first()
        .map(|line| line.code)
        .ok_or_else(|| Error::Protocol("Empty reply".into()))?;

    Ok(Reply::new(code, lines.into_iter().map(|line| line.text).collect()))
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
    fn test_parse_final_line() {
        let line = parse_line("220 relay.example.com ESMTP ready").unwrap();
        assert_eq!(line.code, ReplyCode::SERVICE_READY);
        assert!(!line.more);
        assert_eq!(line.text, "relay.example.com ESMTP ready");
    }

    #[test]
    fn test_parse_continuation_line() {
        let line = parse_line("250-STARTTLS").unwrap();
        assert_eq!(line.code, ReplyCode::OK);
        assert!(line.more);
        assert_eq!(line.text, "STARTTLS");
    }

    #[test]
    fn test_parse_bare_code() {
        let line = parse_line("354").unwrap();
        assert_eq!(line.code, ReplyCode::START_DATA);
        assert!(!line.more);
        assert_eq!(line.text, "");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_line("").is_err());
        assert!(parse_line("25").is_err());
        assert!(parse_line("ABC OK").is_err());
        assert!(parse_line("2500 OK").is_err());
        assert!(parse_line("+OK pop3 style").is_err());
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let lines = vec![
            parse_line("250-relay.example.com").unwrap(),
            parse_line("250-STARTTLS").unwrap(),
            parse_line("250 AUTH LOGIN").unwrap(),
        ];
        let reply = parse_reply(lines).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(
            reply.message,
            vec!["relay.example.com", "STARTTLS", "AUTH LOGIN"]
        );
    }

    #[test]
    fn test_reply_code_comes_from_first_line() {
        let lines = vec![
            parse_line("334-VXNlcm5hbWU6").unwrap(),
            parse_line("250 odd").unwrap(),
        ];
        assert_eq!(parse_reply(lines).unwrap().code, ReplyCode::AUTH_CONTINUE);
    }

    #[test]
    fn test_parse_empty_reply() {
        assert!(parse_reply(Vec::new()).is_err());
    }
}
