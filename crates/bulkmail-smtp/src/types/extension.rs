//! Keywords from the EHLO reply.

/// One advertised capability.
///
/// Only STARTTLS, AUTH and SIZE affect the session. Anything else is carried
/// verbatim for logging.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// `STARTTLS`
    StartTls,
    /// `AUTH` with the mechanisms this client recognises.
    Auth(Vec<AuthMechanism>),
    /// `SIZE`, with the limit when one is given.
    Size(Option<usize>),
    /// The full line of an extension the session ignores.
    Unknown(String),
}

impl Extension {
    /// Reads one EHLO line, code and separator already stripped.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        match words.next() {
            Some(kw) if kw.eq_ignore_ascii_case("STARTTLS") => Self::StartTls,
            Some(kw) if kw.eq_ignore_ascii_case("AUTH") => {
                Self::Auth(words.filter_map(AuthMechanism::from_name).collect())
            }
            Some(kw) if kw.eq_ignore_ascii_case("SIZE") => {
                Self::Size(words.next().and_then(|n| n.parse().ok()))
            }
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// SASL mechanism names this client knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// `LOGIN`, the one the session uses.
    Login,
    /// `PLAIN`
    Plain,
}

impl AuthMechanism {
    fn from_name(name: &str) -> Option<Self> {
        [Self::Login, Self::Plain]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "LOGIN",
            Self::Plain => "PLAIN",
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
    fn test_keywords_ignore_case() {
        assert_eq!(Extension::parse("StartTLS"), Extension::StartTls);
        assert_eq!(
            Extension::parse("auth login"),
            Extension::Auth(vec![AuthMechanism::Login])
        );
    }

    #[test]
    fn test_auth_keeps_known_mechanisms_in_order() {
        assert_eq!(
            Extension::parse("AUTH PLAIN CRAM-MD5 LOGIN XOAUTH2"),
            Extension::Auth(vec![AuthMechanism::Plain, AuthMechanism::Login])
        );
    }

    #[test]
    fn test_size_limit() {
        assert_eq!(
            Extension::parse("SIZE 10240000"),
            Extension::Size(Some(10_240_000))
        );
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
        assert_eq!(Extension::parse("SIZE lots"), Extension::Size(None));
    }

    #[test]
    fn test_other_lines_kept_verbatim() {
        assert_eq!(
            Extension::parse("PIPELINING"),
            Extension::Unknown("PIPELINING".to_string())
        );
        assert_eq!(Extension::parse("  "), Extension::Unknown("  ".to_string()));
    }
}
