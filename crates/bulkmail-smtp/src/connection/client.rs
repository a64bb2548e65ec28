//! Type-state SMTP session.
//!
//! Each state is a marker type; every transition consumes the client and
//! returns it in the next state, so commands cannot be issued out of order.
//! A failed transition drops the stream, which closes the connection.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use base64::Engine;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use super::{Connector, ServerInfo};
use crate::command::{Command, encode_data};
use crate::error::{Error, Result};
use crate::parser::{parse_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, OutboundMessage, Reply, ReplyCode};

/// Where a delivery attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No stream yet.
    Disconnected,
    /// Stream open (and encrypted for implicit TLS), greeting not read.
    Connected,
    /// 220 greeting received and EHLO accepted.
    Greeted,
    /// STARTTLS completed and EHLO repeated over TLS.
    TlsUpgraded,
    /// AUTH LOGIN accepted.
    Authenticated,
    /// Relay accepted the message data.
    MessageSent,
    /// A transition failed; the attempt is over. The state reached before
    /// the failure is kept in `Delivery::failed_in`.
    Failed,
    /// Stream closed.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Greeted => "greeted",
            Self::TlsUpgraded => "tls-upgraded",
            Self::Authenticated => "authenticated",
            Self::MessageSent => "message-sent",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Marker trait tying a type-state to its [`SessionState`].
pub trait Phase {
    /// Runtime state for this marker.
    const STATE: SessionState;
}

/// Phases from which AUTH LOGIN may be issued.
pub trait ReadyToAuthenticate: Phase {}

/// Type-state marker: stream open, greeting pending.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker: greeting read.
#[derive(Debug)]
pub struct Greeted;

/// Type-state marker: upgraded with STARTTLS.
#[derive(Debug)]
pub struct TlsUpgraded;

/// Type-state marker: authenticated.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker: message accepted.
#[derive(Debug)]
pub struct MessageSent;

impl Phase for Connected {
    const STATE: SessionState = SessionState::Connected;
}

impl Phase for Greeted {
    const STATE: SessionState = SessionState::Greeted;
}

impl Phase for TlsUpgraded {
    const STATE: SessionState = SessionState::TlsUpgraded;
}

impl Phase for Authenticated {
    const STATE: SessionState = SessionState::Authenticated;
}

impl Phase for MessageSent {
    const STATE: SessionState = SessionState::MessageSent;
}

impl ReadyToAuthenticate for Greeted {}
impl ReadyToAuthenticate for TlsUpgraded {}

/// SMTP client over any byte stream, with type-state pattern.
#[derive(Debug)]
pub struct Client<S, P> {
    stream: BufReader<S>,
    timeout: Duration,
    server_info: ServerInfo,
    _phase: PhantomData<P>,
}

impl<S, P: Phase> Client<S, P> {
    /// Returns the runtime state of this client.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        P::STATE
    }

    /// Returns what the server told us in its greeting and EHLO reply.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn into_phase<Q>(self) -> Client<S, Q> {
        Client {
            stream: self.stream,
            timeout: self.timeout,
            server_info: self.server_info,
            _phase: PhantomData,
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S, Connected> {
    /// Wraps a freshly opened stream. For implicit TLS the stream must
    /// already be encrypted.
    #[must_use]
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            timeout,
            server_info: ServerInfo::default(),
            _phase: PhantomData,
        }
    }

    /// Reads the server greeting, which must be a 220.
    ///
    /// # Errors
    ///
    /// Returns an error on any other code, a malformed reply, EOF or timeout.
    pub async fn read_greeting(mut self) -> Result<Client<S, Greeted>> {
        let greeting = self
            .read_reply("greeting")
            .await?
            .expect(ReplyCode::SERVICE_READY)?;

        self.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %self.server_info.hostname, "greeting received");

        Ok(self.into_phase())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S, Greeted> {
    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 250.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.negotiate(client_hostname).await?;
        Ok(self)
    }

    /// Upgrades the connection with STARTTLS, then repeats EHLO over TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is refused, the handshake fails, or the
    /// second EHLO is rejected.
    pub async fn starttls<C>(
        mut self,
        connector: &C,
        hostname: &str,
        client_hostname: &str,
    ) -> Result<Client<S, TlsUpgraded>>
    where
        C: Connector<Stream = S>,
    {
        if !self.server_info.supports_starttls() {
            warn!(server = %self.server_info.hostname, "STARTTLS not advertised, trying anyway");
        }

        self.command(Command::StartTls, ReplyCode::SERVICE_READY)
            .await?;

        // Anything already buffered was sent in plaintext and must not be
        // read as if it came over TLS.
        if !self.stream.buffer().is_empty() {
            return Err(Error::Protocol("Unexpected data after STARTTLS reply".into()));
        }

        let timeout = self.timeout;
        let plain = self.stream.into_inner();
        let handshake = connector.secure(plain, hostname);
        let secured = bounded(timeout, "TLS handshake", handshake).await?;
        debug!(%hostname, "TLS established via STARTTLS");

        let mut client = Client {
            stream: BufReader::new(secured),
            timeout,
            server_info: ServerInfo {
                hostname: self.server_info.hostname,
                extensions: Vec::new(),
            },
            _phase: PhantomData,
        };
        client.negotiate(client_hostname).await?;
        Ok(client)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin, P: ReadyToAuthenticate> Client<S, P> {
    /// Authenticates with AUTH LOGIN.
    ///
    /// Prompts are not decoded; only their 334 code is checked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] wrapping whatever went wrong.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let mechanisms = self.server_info.auth_mechanisms();
        if !mechanisms.is_empty() && !mechanisms.contains(&AuthMechanism::Login) {
            warn!(advertised = ?mechanisms, "server does not advertise AUTH LOGIN");
        }

        self.login_exchange(username, password)
            .await
            .map_err(|e| Error::Authentication(Box::new(e)))?;

        Ok(self.into_phase())
    }

    async fn login_exchange(&mut self, username: &str, password: &str) -> Result<()> {
        let engine = base64::engine::general_purpose::STANDARD;

        self.command(
            Command::Auth {
                mechanism: AuthMechanism::Login,
            },
            ReplyCode::AUTH_CONTINUE,
        )
        .await?;
        self.command(
            Command::AuthResponse(engine.encode(username)),
            ReplyCode::AUTH_CONTINUE,
        )
        .await?;
        self.command(
            Command::AuthResponse(engine.encode(password)),
            ReplyCode::AUTH_SUCCEEDED,
        )
        .await?;
        Ok(())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S, Authenticated> {
    /// Runs the envelope and transfers the message.
    ///
    /// Sends `MAIL FROM`, `RCPT TO` and `DATA`, then the dot-stuffed payload
    /// and terminator, and waits for the relay to accept it.
    ///
    /// # Errors
    ///
    /// Returns an error at the first reply that is not the expected one; no
    /// later command is sent.
    pub async fn send_mail(
        mut self,
        sender: &Address,
        message: &OutboundMessage,
    ) -> Result<Client<S, MessageSent>> {
        self.command(
            Command::MailFrom {
                from: sender.clone(),
            },
            ReplyCode::OK,
        )
        .await?;
        self.command(
            Command::RcptTo {
                to: message.recipient().clone(),
            },
            ReplyCode::OK,
        )
        .await?;
        self.command(Command::Data, ReplyCode::START_DATA).await?;

        let data = encode_data(message.payload());
        debug!(bytes = data.len(), "> <message data>");
        self.write(&data, "message data").await?;
        self.read_reply("end of data")
            .await?
            .expect(ReplyCode::OK)?;

        Ok(self.into_phase())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin, P: Phase> Client<S, P> {
    /// Sends QUIT, expects 221, and shuts the stream down either way.
    ///
    /// # Errors
    ///
    /// Returns an error if QUIT was not answered with 221.
    pub async fn quit(mut self) -> Result<()> {
        let result = self.command(Command::Quit, ReplyCode::CLOSING).await;
        if let Err(e) = bounded(self.timeout, "shutdown", async {
            self.stream.get_mut().shutdown().await.map_err(Error::from)
        })
        .await
        {
            debug!(error = %e, "shutdown after QUIT failed");
        }
        result.map(|_| ())
    }

    async fn negotiate(&mut self, client_hostname: &str) -> Result<()> {
        let reply = self
            .command(
                Command::Ehlo {
                    hostname: client_hostname.to_string(),
                },
                ReplyCode::OK,
            )
            .await?;

        // First line is the server's own greeting, the rest are keywords.
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(String::as_str)
            .map(Extension::parse)
            .collect();
        Ok(())
    }

    async fn command(&mut self, cmd: Command, expected: ReplyCode) -> Result<Reply> {
        debug!("> {cmd:?}");
        self.write(&cmd.serialize(), cmd.name()).await?;
        self.read_reply(cmd.name()).await?.expect(expected)
    }

    async fn write(&mut self, data: &[u8], during: &'static str) -> Result<()> {
        let writer = self.stream.get_mut();
        bounded(self.timeout, during, async {
            writer.write_all(data).await?;
            writer.flush().await?;
            Ok(())
        })
        .await
    }

    async fn read_reply(&mut self, during: &'static str) -> Result<Reply> {
        let reader = &mut self.stream;
        bounded(self.timeout, during, async {
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).await? == 0 {
                    return Err(Error::ConnectionClosed);
                }

                let line = line.trim_end_matches(['\r', '\n']);
                debug!("< {line}");
                let parsed = parse_line(line)?;
                let more = parsed.more;
                lines.push(parsed);

                if !more {
                    break;
                }
            }
            parse_reply(lines)
        })
        .await
    }
}

/// Runs `fut` under `after`, mapping expiry to [`Error::Timeout`].
pub(crate) async fn bounded<T>(
    after: Duration,
    during: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Error::Timeout { after, during })?
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
    use crate::ErrorKind;
    use tokio_test::io::Builder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn message() -> OutboundMessage {
        OutboundMessage::new(
            Address::new("reader@example.org").unwrap(),
            b"Subject: hi\r\n\r\n.\r\n".to_vec(),
        )
    }

    #[tokio::test]
    async fn test_plain_session_command_order() {
        let mock = Builder::new()
            .read(b"220 relay.example.com ESMTP\r\n")
            .write(b"EHLO client.example.com\r\n")
            .read(b"250-relay.example.com\r\n250-SIZE 1000000\r\n250 AUTH LOGIN PLAIN\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"235 2.7.0 Authentication successful\r\n")
            .write(b"MAIL FROM:<news@example.com>\r\n")
            .read(b"250 2.1.0 Ok\r\n")
            .write(b"RCPT TO:<reader@example.org>\r\n")
            .read(b"250 2.1.5 Ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
            .write(b"Subject: hi\r\n\r\n..\r\n.\r\n")
            .read(b"250 2.0.0 Ok: queued\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 2.0.0 Bye\r\n")
            .build();

        let client = Client::new(mock, TIMEOUT);
        assert_eq!(client.state(), SessionState::Connected);

        let client = client.read_greeting().await.unwrap();
        assert_eq!(client.server_info().hostname, "relay.example.com");

        let client = client.ehlo("client.example.com").await.unwrap();
        assert_eq!(client.state(), SessionState::Greeted);
        assert_eq!(client.server_info().max_message_size(), Some(1_000_000));
        assert!(!client.server_info().supports_starttls());

        let client = client.auth_login("user", "pass").await.unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);

        let sender = Address::new("news@example.com").unwrap();
        let client = client.send_mail(&sender, &message()).await.unwrap();
        assert_eq!(client.state(), SessionState::MessageSent);

        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_greeting_must_be_220() {
        let mock = Builder::new()
            .read(b"554 5.3.2 not accepting mail\r\n")
            .build();

        let client = Client::new(mock, TIMEOUT);
        let err = client.read_greeting().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(matches!(
            err,
            Error::UnexpectedReply { code, .. } if code == ReplyCode::TRANSACTION_FAILED
        ));
    }

    #[tokio::test]
    async fn test_bad_password_is_authentication_error() {
        let mock = Builder::new()
            .read(b"220 relay ESMTP\r\n")
            .write(b"EHLO client\r\n")
            .read(b"250 relay\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"d3Jvbmc=\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n")
            .build();

        let client = Client::new(mock, TIMEOUT)
            .read_greeting()
            .await
            .unwrap()
            .ehlo("client")
            .await
            .unwrap();
        let err = client.auth_login("user", "wrong").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(err.to_string().contains("535"));
    }

    #[tokio::test]
    async fn test_rejected_recipient_stops_before_data() {
        let mock = Builder::new()
            .read(b"220 relay ESMTP\r\n")
            .write(b"EHLO client\r\n")
            .read(b"250 relay\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"dXNlcg==\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"cGFzcw==\r\n")
            .read(b"235 ok\r\n")
            .write(b"MAIL FROM:<news@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<reader@example.org>\r\n")
            .read(b"550 5.1.1 no such user\r\n")
            .build();

        let client = Client::new(mock, TIMEOUT)
            .read_greeting()
            .await
            .unwrap()
            .ehlo("client")
            .await
            .unwrap()
            .auth_login("user", "pass")
            .await
            .unwrap();
        let sender = Address::new("news@example.com").unwrap();
        let err = client.send_mail(&sender, &message()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::UnexpectedReply { expected, code, .. }
                if expected == ReplyCode::OK && code == ReplyCode::MAILBOX_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_protocol_error() {
        let mock = Builder::new().read(b"hello there\r\n").build();

        let client = Client::new(mock, TIMEOUT);
        let err = client.read_greeting().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::TlsUpgraded.to_string(), "tls-upgraded");
        assert_eq!(SessionState::MessageSent.to_string(), "message-sent");
    }
}
