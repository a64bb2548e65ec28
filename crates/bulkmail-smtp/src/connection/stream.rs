//! Byte streams and the connector seam.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::error::{Error, Result};

/// Opens byte streams to a relay and upgrades them to TLS.
///
/// The session only ever talks to this trait, so tests can drive the whole
/// protocol against an in-memory relay.
pub trait Connector: Send + Sync {
    /// Stream type produced by this connector, plain or encrypted.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a plaintext byte stream to `host:port`.
    fn connect(&self, host: &str, port: u16) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Performs a TLS handshake on `stream`, verifying the peer as `host`.
    fn secure(
        &self,
        stream: Self::Stream,
        host: &str,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// A socket to the relay, before or after the TLS handshake.
#[derive(Debug)]
pub enum SmtpStream {
    /// Plaintext socket.
    Tcp(TcpStream),
    /// Socket wrapped in a rustls session.
    Tls(Box<TlsStream<TcpStream>>),
}

impl SmtpStream {
    /// Whether the handshake has happened.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Connector over real TCP sockets with rustls.
///
/// TLS is restricted to 1.2 and 1.3 and peers are verified against the
/// webpki root store.
#[derive(Clone)]
pub struct TcpConnector {
    tls: TlsConnector,
}

impl TcpConnector {
    /// Creates a connector with the default TLS policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tls: tls_policy(),
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnector").finish_non_exhaustive()
    }
}

impl Connector for TcpConnector {
    type Stream = SmtpStream;

    async fn connect(&self, host: &str, port: u16) -> Result<SmtpStream> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| Error::Connect {
                addr: format!("{host}:{port}"),
                source,
            })?;
        Ok(SmtpStream::Tcp(stream))
    }

    async fn secure(&self, stream: SmtpStream, host: &str) -> Result<SmtpStream> {
        let tcp = match stream {
            SmtpStream::Tcp(tcp) => tcp,
            SmtpStream::Tls(_) => return Err(Error::Protocol("Stream is already TLS".into())),
        };

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| Error::InvalidHostname(host.to_string()))?;

        let tls = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(|source| Error::Handshake {
                host: host.to_string(),
                source,
            })?;
        Ok(SmtpStream::Tls(Box::new(tls)))
    }
}

fn tls_policy() -> TlsConnector {
    let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let versions = [&rustls::version::TLS13, &rustls::version::TLS12];
    let config = ClientConfig::builder_with_protocol_versions(&versions)
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
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

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = TcpConnector::new();
        let err = connector.connect("127.0.0.1", port).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Connection);
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[tokio::test]
    async fn test_secure_rejects_invalid_hostname() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = TcpConnector::new();

        let stream = connector.connect("127.0.0.1", port).await.unwrap();
        assert!(!stream.is_tls());
        let err = connector
            .secure(stream, "not a hostname!")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHostname(_)));
    }
}
