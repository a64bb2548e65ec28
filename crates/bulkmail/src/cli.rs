//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Send a templated email campaign to a CSV list of recipients.
#[derive(Debug, Parser)]
#[command(name = "bulkmail", about = "Bulk email sender", version)]
pub struct Cli {
    /// Recipients CSV with an `email` and optional `name` column.
    #[arg(long, default_value = "data/recipients.csv")]
    pub recipients: PathBuf,

    /// Links CSV with a `url` and optional `text` column. Skipped if missing.
    #[arg(long, default_value = "data/links.csv")]
    pub links: PathBuf,

    /// Directory holding `<template>.html` and `<template>.txt`.
    #[arg(long, default_value = "templates")]
    pub templates: PathBuf,

    /// Template name, without extension.
    #[arg(long)]
    pub template: Option<String>,

    /// Subject line.
    #[arg(long)]
    pub subject: String,

    /// Build every message without connecting to the relay.
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds between messages. Overrides `THROTTLE`.
    #[arg(long)]
    pub delay: Option<f64>,

    /// Concurrent sends. Overrides `MAX_WORKERS`.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    pub verbose: bool,
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
    use clap::CommandFactory;

    #[test]
    fn test_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["bulkmail", "--subject", "Hello"]).unwrap();
        assert_eq!(cli.recipients, PathBuf::from("data/recipients.csv"));
        assert_eq!(cli.links, PathBuf::from("data/links.csv"));
        assert_eq!(cli.templates, PathBuf::from("templates"));
        assert_eq!(cli.template, None);
        assert!(!cli.dry_run);
        assert_eq!(cli.delay, None);
    }

    #[test]
    fn test_subject_is_required() {
        assert!(Cli::try_parse_from(["bulkmail"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "bulkmail",
            "--subject",
            "Hi",
            "--template",
            "promo",
            "--dry-run",
            "--delay",
            "0.5",
            "--workers",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.template.as_deref(), Some("promo"));
        assert!(cli.dry_run);
        assert_eq!(cli.delay, Some(0.5));
        assert_eq!(cli.workers, Some(4));
    }
}
