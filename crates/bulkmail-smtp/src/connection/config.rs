//! Session configuration types.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Address;

/// Transport security, selected by the relay port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// TLS before any SMTP byte (port 465).
    Implicit,
    /// Plaintext greeting and EHLO, then mandatory STARTTLS (ports 587 and 25).
    StartTls,
    /// Plaintext only, no upgrade attempted.
    Plain,
}

impl TransportMode {
    /// Returns the transport used for `port`.
    #[must_use]
    pub const fn for_port(port: u16) -> Self {
        match port {
            465 => Self::Implicit,
            587 | 25 => Self::StartTls,
            _ => Self::Plain,
        }
    }
}

/// Relay, credentials and retry policy shared by every send.
#[derive(Clone)]
pub struct SessionConfig {
    /// Relay hostname, also used for certificate verification.
    pub host: String,
    /// Relay port; decides the [`TransportMode`].
    pub port: u16,
    /// AUTH LOGIN username.
    pub username: String,
    /// AUTH LOGIN password.
    pub password: String,
    /// Envelope sender (`MAIL FROM`).
    pub sender: Address,
    /// Bound on every connect, handshake, read and write.
    pub timeout: Duration,
    /// Whole-session attempts per message, at least 1.
    pub max_attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
    /// Name sent with EHLO.
    pub helo_name: String,
    /// Whether a rejected AUTH LOGIN is retried like any other failure.
    pub retry_auth_failures: bool,
}

impl SessionConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>, sender: Address) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host, sender)
    }

    /// Returns the transport mode implied by the port.
    #[must_use]
    pub const fn transport(&self) -> TransportMode {
        TransportMode::for_port(self.port)
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("sender", &self.sender)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("helo_name", &self.helo_name)
            .field("retry_auth_failures", &self.retry_auth_failures)
            .finish()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: u16,
    username: String,
    password: String,
    sender: Address,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    helo_name: Option<String>,
    retry_auth_failures: bool,
}

impl SessionConfigBuilder {
    /// Creates a new builder for submission on port 587.
    #[must_use]
    pub fn new(host: impl Into<String>, sender: Address) -> Self {
        Self {
            host: host.into(),
            port: 587,
            username: String::new(),
            password: String::new(),
            sender,
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            helo_name: None,
            retry_auth_failures: true,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the AUTH LOGIN credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of attempts per message.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the EHLO name. Defaults to the local hostname.
    #[must_use]
    pub fn helo_name(mut self, name: impl Into<String>) -> Self {
        self.helo_name = Some(name.into());
        self
    }

    /// Sets whether rejected credentials are retried.
    #[must_use]
    pub const fn retry_auth_failures(mut self, retry: bool) -> Self {
        self.retry_auth_failures = retry;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty host, port 0, zero
    /// attempts, or a zero timeout.
    pub fn build(self) -> Result<SessionConfig> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("relay host is empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("relay port must be 1-65535".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max attempts must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive".into()));
        }

        let helo_name = self
            .helo_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(local_hostname);

        Ok(SessionConfig {
            host: self.host.trim().to_string(),
            port: self.port,
            username: self.username,
            password: self.password,
            sender: self.sender,
            timeout: self.timeout,
            max_attempts: self.max_attempts,
            retry_delay: self.retry_delay,
            helo_name,
            retry_auth_failures: self.retry_auth_failures,
        })
    }
}

fn local_hostname() -> String {
    let name = gethostname::gethostname().to_string_lossy().into_owned();
    if name.is_empty() { "localhost".to_string() } else { name }
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

    fn sender() -> Address {
        Address::new("news@example.com").unwrap()
    }

    #[test]
    fn test_transport_for_port() {
        assert_eq!(TransportMode::for_port(465), TransportMode::Implicit);
        assert_eq!(TransportMode::for_port(587), TransportMode::StartTls);
        assert_eq!(TransportMode::for_port(25), TransportMode::StartTls);
        assert_eq!(TransportMode::for_port(2525), TransportMode::Plain);
        assert_eq!(TransportMode::for_port(1025), TransportMode::Plain);
    }

    #[test]
    fn test_builder_defaults() {
        let config = SessionConfig::builder("smtp.example.com", sender())
            .helo_name("client.example.com")
            .build()
            .unwrap();
        assert_eq!(config.port, 587);
        assert_eq!(config.transport(), TransportMode::StartTls);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.helo_name, "client.example.com");
        assert!(config.retry_auth_failures);
    }

    #[test]
    fn test_builder_falls_back_to_hostname() {
        let config = SessionConfig::builder("smtp.example.com", sender())
            .helo_name("  ")
            .build()
            .unwrap();
        assert!(!config.helo_name.trim().is_empty());
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(SessionConfig::builder(" ", sender()).build().is_err());
        let zero_port = SessionConfig::builder("h.example.com", sender()).port(0);
        assert!(zero_port.build().is_err());
        let err = SessionConfig::builder("h.example.com", sender())
            .max_attempts(0)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
        assert!(
            SessionConfig::builder("h.example.com", sender())
                .timeout(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SessionConfig::builder("smtp.example.com", sender())
            .credentials("user", "hunter2")
            .helo_name("client")
            .build()
            .unwrap();
        let shown = format!("{config:?}");
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("hunter2"));
    }
}
