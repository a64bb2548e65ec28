//! `bulkmail` - bulk email campaign sender.
//!
//! Reads recipients and links from CSV, renders each message from templates
//! and delivers it over SMTP with retry. Relay and sender settings come from
//! the environment (or a `.env` file).
//!
//! Exit codes: 0 when every message was sent, 1 on a setup error, 2 when
//! some messages failed, 130 when interrupted.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::process::ExitCode;

use anyhow::{Context, bail};
use bulkmail_core::{
    Campaign, CampaignOptions, MessageBuilder, Settings, Templates, load_links, load_recipients,
};
use bulkmail_smtp::Mailer;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

const EXIT_SETUP: u8 = 1;
const EXIT_PARTIAL: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_SETUP)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "bulkmail=debug,bulkmail_core=debug,bulkmail_smtp=debug"
    } else {
        "bulkmail=info,bulkmail_core=info,bulkmail_smtp=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = Settings::from_env().context("Invalid settings")?;
    if let Some(delay) = cli.delay {
        settings.throttle = delay;
    }
    if let Some(workers) = cli.workers {
        settings.max_workers = workers;
    }
    settings.validate().context("Invalid settings")?;

    let recipients = load_recipients(&cli.recipients)?;
    if recipients.is_empty() {
        bail!("No valid recipients found in {}", cli.recipients.display());
    }

    let links = if cli.links.exists() {
        load_links(&cli.links, settings.click_tracking_domain())?
    } else {
        info!(path = %cli.links.display(), "No links file, sending without links");
        Vec::new()
    };

    let templates = Templates::load(&cli.templates, cli.template.as_deref())?;
    let builder = MessageBuilder::new(
        settings.sender()?,
        cli.subject,
        templates,
        links,
        settings.tracking(),
    );

    let mailer = Mailer::new(settings.session_config()?);
    let options = CampaignOptions {
        dry_run: cli.dry_run,
        throttle: settings.throttle(),
        max_workers: settings.max_workers,
    };
    info!(
        relay = %format!("{}:{}", settings.smtp_server, settings.smtp_port),
        recipients = recipients.len(),
        dry_run = options.dry_run,
        "Starting campaign"
    );

    let campaign = Campaign::new(mailer, builder, options);
    let report = campaign.run(&recipients, interrupted()).await;

    if report.cancelled {
        warn!("Operation cancelled by user: {}", report.tally);
        return Ok(ExitCode::from(EXIT_CANCELLED));
    }

    info!("Campaign complete: {}", report.tally);
    if report.tally.failed == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_PARTIAL))
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
