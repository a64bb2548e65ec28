//! Outbound message handed to the mailer.

use super::Address;

/// A fully formed message and its single envelope recipient.
///
/// The payload is an RFC 5322 message (headers, blank line, body). The
/// session normalizes line endings and dot-stuffs it on the wire; the
/// message itself is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    recipient: Address,
    payload: Vec<u8>,
}

impl OutboundMessage {
    /// Creates a new outbound message.
    #[must_use]
    pub fn new(recipient: Address, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            recipient,
            payload: payload.into(),
        }
    }

    /// Envelope recipient (`RCPT TO`).
    #[must_use]
    pub const fn recipient(&self) -> &Address {
        &self.recipient
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}
