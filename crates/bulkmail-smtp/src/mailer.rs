//! Whole-session retry around the type-state client.

use tracing::{debug, error, info, warn};

use crate::connection::{
    Client, Connector, SessionConfig, SessionState, TcpConnector, TransportMode, bounded,
};
use crate::error::{Error, Result};
use crate::types::OutboundMessage;

/// Outcome of [`Mailer::deliver`].
#[derive(Debug)]
pub struct Delivery {
    /// Sessions opened for this message.
    pub attempts: u32,
    /// Error of the last attempt, if the message was not delivered.
    pub error: Option<Error>,
    /// State the last failed attempt had reached.
    pub failed_in: Option<SessionState>,
}

impl Delivery {
    /// Returns true if the relay accepted the message.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        self.error.is_none()
    }

    /// Terminal state of the last attempt: [`SessionState::Closed`] after a
    /// delivery, [`SessionState::Failed`] otherwise.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.is_delivered() {
            SessionState::Closed
        } else {
            SessionState::Failed
        }
    }
}

/// Delivers messages one session at a time, retrying whole sessions.
///
/// Every attempt opens a fresh connection, runs the full protocol from the
/// greeting, and closes the connection before returning. The mailer holds
/// no connection between calls, so one instance can be shared behind an
/// `Arc` by concurrent senders.
#[derive(Debug)]
pub struct Mailer<C = TcpConnector> {
    config: SessionConfig,
    connector: C,
}

impl Mailer<TcpConnector> {
    /// Creates a mailer that dials real TCP/TLS connections.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, TcpConnector::new())
    }
}

impl<C: Connector> Mailer<C> {
    /// Creates a mailer over a custom connector.
    #[must_use]
    pub const fn with_connector(config: SessionConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Delivers `message`, returning whether the relay accepted it.
    pub async fn send(&self, message: &OutboundMessage) -> bool {
        self.deliver(message).await.is_delivered()
    }

    /// Delivers `message` with up to `max_attempts` sessions.
    ///
    /// Failed attempts are followed by `retry_delay`, except the last one.
    /// Validation errors end the loop at once, and so do authentication
    /// errors unless `retry_auth_failures` is set.
    pub async fn deliver(&self, message: &OutboundMessage) -> Delivery {
        let max_attempts = self.config.max_attempts.max(1);
        let recipient = message.recipient();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut state = SessionState::Disconnected;

            match self.attempt(message, &mut state).await {
                Ok(()) => {
                    info!(%recipient, attempt, "email sent");
                    return Delivery {
                        attempts: attempt,
                        error: None,
                        failed_in: None,
                    };
                }
                Err(e) => {
                    warn!(
                        %recipient,
                        attempt,
                        max_attempts,
                        %state,
                        kind = %e.kind(),
                        "attempt failed: {e}"
                    );

                    let retry = attempt < max_attempts
                        && e.is_retryable(self.config.retry_auth_failures);
                    if !retry {
                        error!(%recipient, attempts = attempt, "failed to send: {e}");
                        return Delivery {
                            attempts: attempt,
                            error: Some(e),
                            failed_in: Some(state),
                        };
                    }

                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// Runs one session from connect to QUIT, updating `state` as it goes.
    async fn attempt(&self, message: &OutboundMessage, state: &mut SessionState) -> Result<()> {
        let config = &self.config;
        let mode = config.transport();
        info!(host = %config.host, port = config.port, ?mode, "connecting");

        let stream = bounded(
            config.timeout,
            "connect",
            self.connector.connect(&config.host, config.port),
        )
        .await?;
        let stream = if mode == TransportMode::Implicit {
            bounded(
                config.timeout,
                "TLS handshake",
                self.connector.secure(stream, &config.host),
            )
            .await?
        } else {
            stream
        };

        let client = Client::new(stream, config.timeout);
        *state = client.state();

        let client = client
            .read_greeting()
            .await?
            .ehlo(&config.helo_name)
            .await?;
        *state = client.state();

        let client = match mode {
            TransportMode::StartTls => {
                let client = client
                    .starttls(&self.connector, &config.host, &config.helo_name)
                    .await?;
                *state = client.state();
                debug!("TLS connection established");
                client.auth_login(&config.username, &config.password).await?
            }
            TransportMode::Implicit | TransportMode::Plain => {
                client.auth_login(&config.username, &config.password).await?
            }
        };
        *state = client.state();
        debug!("authenticated");

        let client = client.send_mail(&config.sender, message).await?;
        *state = client.state();

        // The relay has the message; a failed QUIT must not trigger a resend.
        if let Err(e) = client.quit().await {
            warn!(recipient = %message.recipient(), "QUIT after delivery failed: {e}");
        }
        *state = SessionState::Closed;
        Ok(())
    }
}
