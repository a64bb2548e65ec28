//! Error types for campaign setup and message building.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// SMTP-level error, such as an invalid address.
    #[error("SMTP error: {0}")]
    Smtp(#[from] bulkmail_smtp::Error),

    /// A campaign input file could not be read.
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        /// File that was opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// CSV decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A CSV file lacks a required column.
    #[error("{} must contain a '{column}' column", path.display())]
    MissingColumn {
        /// File that was read.
        path: PathBuf,
        /// Column that was expected.
        column: &'static str,
    },

    /// A template file does not exist.
    #[error("Template not found: {}", path.display())]
    TemplateNotFound {
        /// Expected template path.
        path: PathBuf,
    },

    /// Template compilation or rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Configuration error, naming the offending key.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
