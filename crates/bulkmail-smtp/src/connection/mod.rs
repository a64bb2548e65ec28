//! Session plumbing: the type-state client, its configuration and streams.

mod client;
mod config;
mod stream;

pub(crate) use client::bounded;
pub use client::{
    Authenticated, Client, Connected, Greeted, MessageSent, Phase, ReadyToAuthenticate,
    SessionState, TlsUpgraded,
};
pub use config::{SessionConfig, SessionConfigBuilder, TransportMode};
pub use stream::{Connector, SmtpStream, TcpConnector};

use crate::types::{AuthMechanism, Extension};

/// What the relay told us about itself.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Name from the greeting line.
    pub hostname: String,
    /// EHLO keywords, in the order advertised.
    pub extensions: Vec<Extension>,
}

impl ServerInfo {
    /// Whether STARTTLS was advertised.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.extensions.contains(&Extension::StartTls)
    }

    /// The SIZE limit, when one was given.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| {
            if let Extension::Size(limit) = ext { *limit } else { None }
        })
    }

    /// Mechanisms listed after AUTH. Empty if AUTH was not advertised.
    #[must_use]
    pub fn auth_mechanisms(&self) -> &[AuthMechanism] {
        self.extensions
            .iter()
            .find_map(|ext| {
                if let Extension::Auth(list) = ext { Some(list.as_slice()) } else { None }
            })
            .unwrap_or(&[])
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
    fn test_server_info_queries() {
        let info = ServerInfo {
            hostname: "relay.example.com".into(),
            extensions: ["STARTTLS", "AUTH LOGIN", "SIZE 2048"]
                .into_iter()
                .map(Extension::parse)
                .collect(),
        };
        assert!(info.supports_starttls());
        assert_eq!(info.auth_mechanisms(), &[AuthMechanism::Login]);
        assert_eq!(info.max_message_size(), Some(2048));
        assert!(ServerInfo::default().auth_mechanisms().is_empty());
    }
}
