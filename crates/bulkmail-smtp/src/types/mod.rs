//! Values exchanged with the relay: addresses, replies, EHLO keywords, messages.

mod address;
mod extension;
mod message;
mod reply;

pub use address::{Address, is_valid_address};
pub use extension::{AuthMechanism, Extension};
pub use message::OutboundMessage;
pub use reply::{Reply, ReplyCode};
