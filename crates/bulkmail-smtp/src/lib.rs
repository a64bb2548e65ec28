//! # bulkmail-smtp
//!
//! SMTP submission client for bulk sending, speaking the protocol directly
//! over a byte stream.
//!
//! ## Features
//!
//! - **Type-state session**: greeting, EHLO, STARTTLS, AUTH LOGIN, envelope
//!   and DATA can only run in protocol order
//! - **Port-driven transport**: implicit TLS on 465, mandatory STARTTLS on
//!   587 and 25, plaintext elsewhere; TLS 1.2+ with webpki roots
//! - **Whole-session retry**: [`Mailer`] reconnects from scratch on every
//!   attempt with a fixed delay in between
//! - **Dot-stuffing**: payload lines starting with `.` are escaped on the wire
//! - **Pluggable transport**: the [`Connector`] trait lets tests run the full
//!   protocol against an in-memory relay
//!
//! ## Quick Start
//!
//! ```ignore
//! use bulkmail_smtp::{Address, Mailer, OutboundMessage, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> bulkmail_smtp::Result<()> {
//!     let config = SessionConfig::builder("smtp.example.com", Address::new("news@example.com")?)
//!         .port(587)
//!         .credentials("news@example.com", "app-password")
//!         .build()?;
//!     let mailer = Mailer::new(config);
//!
//!     let message = OutboundMessage::new(
//!         Address::new("reader@example.org")?,
//!         b"Subject: Hello\r\n\r\nHi there!\r\n".to_vec(),
//!     );
//!     assert!(mailer.send(&message).await);
//!     Ok(())
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Disconnected ─ connect ─→ Connected ─ read_greeting/ehlo ─→ Greeted
//!                                                              │
//!        ┌──────────── starttls (587/25) ─→ TlsUpgraded ───────┤
//!        ↓                                                     ↓
//!  Authenticated ←──────────────── auth_login ─────────────────┘
//!        │
//!        └─ send_mail ─→ MessageSent ─ quit ─→ Closed
//! ```
//!
//! Any failed transition drops the stream; the attempt ends in `Failed`.
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders and DATA encoding
//! - [`connection`]: Streams, connector seam, configuration, type-state client
//! - [`parser`]: Reply parser
//! - [`types`]: Addresses, replies, extensions, outbound message

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
mod mailer;
pub mod parser;
pub mod types;

pub use connection::{
    Client, Connector, ServerInfo, SessionConfig, SessionConfigBuilder, SessionState, SmtpStream,
    TcpConnector, TransportMode,
};
pub use error::{Error, ErrorKind, Result};
pub use mailer::{Delivery, Mailer};
pub use types::{Address, OutboundMessage, Reply, ReplyCode, is_valid_address};
