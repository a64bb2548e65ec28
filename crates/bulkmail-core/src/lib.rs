//! # bulkmail-core
//!
//! Campaign logic for bulkmail.
//!
//! This crate provides:
//! - Recipient and link loading from CSV files
//! - Template rendering (minijinja) of the plain and HTML bodies
//! - Message building with the campaign headers
//! - Settings from the environment (figment, `.env` support)
//! - The campaign send loop, sequential or with a bounded worker pool

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod campaign;
mod csv_file;
mod error;
pub mod links;
pub mod message;
pub mod recipients;
pub mod settings;
pub mod template;

pub use campaign::{Campaign, CampaignOptions, Report, Tally, Transport};
pub use error::{Error, Result};
pub use links::{Link, load_links, tracked_url};
pub use message::{MessageBuilder, Sender, Tracking, generate_message_id};
pub use recipients::{Recipient, RecipientList, load_recipients, validate_email};
pub use settings::Settings;
pub use template::{RenderedBody, TemplateContext, Templates};
