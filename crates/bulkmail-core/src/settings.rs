//! Runtime settings from the environment.
//!
//! Values come from process environment variables, with a `.env` file in the
//! working directory loaded first when present. Keys are the upper-case
//! field names, e.g. `SMTP_SERVER` or `MAX_WORKERS`.

use std::collections::BTreeMap;
use std::time::Duration;

use bulkmail_smtp::{Address, SessionConfig};
use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::message::{Sender, Tracking};

/// Environment variables the settings read, besides the `MAX_THREADS` alias.
pub const KEYS: &[&str] = &[
    "SMTP_SERVER",
    "SMTP_PORT",
    "SMTP_USERNAME",
    "SMTP_PASSWORD",
    "SENDER_NAME",
    "SENDER_EMAIL",
    "REPLY_TO",
    "TIMEOUT",
    "RETRIES",
    "DELAY",
    "THROTTLE",
    "TRACK_OPENS",
    "TRACK_CLICKS",
    "TRACKING_DOMAIN",
    "MAX_WORKERS",
    "HELO_NAME",
    "RETRY_AUTH_FAILURES",
];

/// Keys whose value is used as written, never parsed.
const TEXT_KEYS: &[&str] = &[
    "SMTP_SERVER",
    "SMTP_USERNAME",
    "SMTP_PASSWORD",
    "SENDER_NAME",
    "SENDER_EMAIL",
    "REPLY_TO",
    "TRACKING_DOMAIN",
    "HELO_NAME",
];

/// Relay, sender, pacing and tracking settings for one run.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Relay hostname.
    pub smtp_server: String,
    /// Relay port. 465 is implicit TLS, 587 and 25 require STARTTLS.
    pub smtp_port: u16,
    /// AUTH LOGIN username.
    pub smtp_username: String,
    /// AUTH LOGIN password.
    pub smtp_password: String,
    /// Display name in the `From` header.
    pub sender_name: String,
    /// Envelope and header sender.
    pub sender_email: String,
    /// `Reply-To` address; the sender when unset.
    pub reply_to: Option<String>,
    /// Per-operation network timeout, seconds.
    pub timeout: u64,
    /// Attempts per message.
    pub retries: u32,
    /// Pause between attempts, seconds.
    pub delay: u64,
    /// Pause between messages, seconds.
    pub throttle: f64,
    /// Pass the open-tracking flag to templates.
    pub track_opens: bool,
    /// Rewrite links through the tracking domain.
    pub track_clicks: bool,
    /// Tracking host.
    pub tracking_domain: Option<String>,
    /// Concurrent sends. 1 keeps delivery strictly sequential.
    pub max_workers: usize,
    /// EHLO name; the local hostname when unset.
    pub helo_name: Option<String>,
    /// Retry attempts whose credentials were rejected.
    pub retry_auth_failures: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".into(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            sender_name: String::new(),
            sender_email: String::new(),
            reply_to: None,
            timeout: 30,
            retries: 3,
            delay: 2,
            throttle: 1.0,
            track_opens: true,
            track_clicks: true,
            tracking_domain: None,
            max_workers: 1,
            helo_name: None,
            retry_auth_failures: true,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"<redacted>")
            .field("sender_name", &self.sender_name)
            .field("sender_email", &self.sender_email)
            .field("reply_to", &self.reply_to)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("delay", &self.delay)
            .field("throttle", &self.throttle)
            .field("track_opens", &self.track_opens)
            .field("track_clicks", &self.track_clicks)
            .field("tracking_domain", &self.tracking_domain)
            .field("max_workers", &self.max_workers)
            .field("helo_name", &self.helo_name)
            .field("retry_auth_failures", &self.retry_auth_failures)
            .finish()
    }
}

impl Settings {
    /// Loads `.env` if present, then reads the environment.
    ///
    /// The result is not validated, so command-line overrides can still be
    /// applied before [`Settings::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the `.env` file is unreadable or a value
    /// does not parse.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!(".env: {e}"))),
        }
        Self::from_figment(&Self::figment())
    }

    /// Defaults overlaid with the known environment variables.
    ///
    /// Text keys are taken as the raw string, so a password such as `123456`
    /// or `true` stays a string. `MAX_THREADS` is read as `MAX_WORKERS`, which
    /// wins when both are set.
    #[must_use]
    pub fn figment() -> Figment {
        let text: BTreeMap<String, String> = TEXT_KEYS
            .iter()
            .filter_map(|key| {
                let value = std::env::var(key).ok()?;
                Some((key.to_ascii_lowercase(), value))
            })
            .collect();
        let max_threads = Env::raw()
            .only(&["MAX_THREADS"])
            .map(|_| "max_workers".into());

        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(max_threads)
            .merge(Env::raw().only(KEYS).ignore(TEXT_KEYS))
            .merge(Serialized::defaults(text))
    }

    /// Extracts settings from `figment` without validating them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value has the wrong type.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks required keys and value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let require = |key: &str, value: &str| {
            if value.trim().is_empty() {
                Err(Error::Config(format!("{key} is required")))
            } else {
                Ok(())
            }
        };
        require("SMTP_SERVER", &self.smtp_server)?;
        require("SMTP_USERNAME", &self.smtp_username)?;
        require("SMTP_PASSWORD", &self.smtp_password)?;
        require("SENDER_EMAIL", &self.sender_email)?;

        if self.smtp_port == 0 {
            return Err(Error::Config("SMTP_PORT must be 1-65535".into()));
        }
        if !bulkmail_smtp::is_valid_address(self.sender_email.trim()) {
            return Err(Error::Config(format!(
                "SENDER_EMAIL is not a valid address: {}",
                self.sender_email
            )));
        }
        if let Some(reply_to) = self.reply_to.as_deref().filter(|r| !r.trim().is_empty())
            && !bulkmail_smtp::is_valid_address(reply_to.trim())
        {
            return Err(Error::Config(format!(
                "REPLY_TO is not a valid address: {reply_to}"
            )));
        }
        if self.timeout == 0 {
            return Err(Error::Config("TIMEOUT must be at least 1 second".into()));
        }
        if self.retries == 0 {
            return Err(Error::Config("RETRIES must be at least 1".into()));
        }
        if !self.throttle.is_finite() || self.throttle < 0.0 {
            return Err(Error::Config("THROTTLE must be a non-negative number".into()));
        }
        if self.max_workers == 0 {
            return Err(Error::Config("MAX_WORKERS must be at least 1".into()));
        }
        Ok(())
    }

    /// Session configuration for the mailer.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender address or relay settings are invalid.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut builder = SessionConfig::builder(&self.smtp_server, self.sender_address()?)
            .port(self.smtp_port)
            .credentials(&self.smtp_username, &self.smtp_password)
            .timeout(Duration::from_secs(self.timeout))
            .max_attempts(self.retries)
            .retry_delay(Duration::from_secs(self.delay))
            .retry_auth_failures(self.retry_auth_failures);
        if let Some(name) = &self.helo_name {
            builder = builder.helo_name(name);
        }
        Ok(builder.build()?)
    }

    /// Sender identity for message headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender or reply-to address is invalid.
    pub fn sender(&self) -> Result<Sender> {
        let email = self.sender_address()?;
        let reply_to = match self.reply_to.as_deref().map(str::trim) {
            Some(addr) if !addr.is_empty() => Address::new(addr)?,
            _ => email.clone(),
        };
        Ok(Sender {
            name: self.sender_name.trim().to_string(),
            email,
            reply_to,
        })
    }

    /// Open and click tracking for templates.
    #[must_use]
    pub fn tracking(&self) -> Tracking {
        Tracking {
            track_opens: self.track_opens,
            domain: self.tracking_host().map(str::to_string),
        }
    }

    /// Domain links are rewritten through, if click tracking is on.
    #[must_use]
    pub fn click_tracking_domain(&self) -> Option<&str> {
        self.tracking_host().filter(|_| self.track_clicks)
    }

    /// Pause between messages.
    #[must_use]
    pub fn throttle(&self) -> Duration {
        Duration::try_from_secs_f64(self.throttle).unwrap_or_default()
    }

    fn tracking_host(&self) -> Option<&str> {
        self.tracking_domain
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    fn sender_address(&self) -> Result<Address> {
        Ok(Address::new(&self.sender_email)?)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names,
    clippy::result_large_err
)]
mod tests {
    use super::*;
    use figment::Jail;

    fn required(jail: &mut Jail) {
        jail.set_env("SMTP_USERNAME", "news@example.com");
        jail.set_env("SMTP_PASSWORD", "app-password");
        jail.set_env("SENDER_EMAIL", "news@example.com");
    }

    #[test]
    fn test_defaults_with_required_keys() {
        Jail::expect_with(|jail| {
            required(jail);

            let settings = Settings::from_figment(&Settings::figment()).unwrap();

            assert_eq!(settings.smtp_server, "smtp.gmail.com");
            assert_eq!(settings.smtp_port, 587);
            assert_eq!(settings.retries, 3);
            assert_eq!(settings.delay, 2);
            assert!((settings.throttle - 1.0).abs() < f64::EPSILON);
            assert!(settings.track_opens && settings.track_clicks);
            assert!(settings.retry_auth_failures);
            assert_eq!(settings.max_workers, 1);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            required(jail);
            jail.set_env("SMTP_SERVER", "relay.example.com");
            jail.set_env("SMTP_PORT", "465");
            jail.set_env("RETRIES", "5");
            jail.set_env("THROTTLE", "0.25");
            jail.set_env("TRACKING_DOMAIN", "track.example.com");
            jail.set_env("TRACK_CLICKS", "false");
            jail.set_env("MAX_WORKERS", "4");
            jail.set_env("RETRY_AUTH_FAILURES", "false");
            jail.set_env("HELO_NAME", "mailer.example.com");

            let settings = Settings::from_figment(&Settings::figment()).unwrap();
            let session = settings.session_config().unwrap();

            assert_eq!(session.host, "relay.example.com");
            assert_eq!(session.port, 465);
            assert_eq!(session.max_attempts, 5);
            assert_eq!(session.helo_name, "mailer.example.com");
            assert!(!session.retry_auth_failures);
            assert_eq!(settings.throttle(), Duration::from_millis(250));
            assert_eq!(settings.max_workers, 4);
            assert_eq!(settings.click_tracking_domain(), None);
            assert_eq!(
                settings.tracking().domain.as_deref(),
                Some("track.example.com")
            );
            Ok(())
        });
    }

    #[test]
    fn test_missing_password_names_key() {
        Jail::expect_with(|jail| {
            jail.set_env("SMTP_USERNAME", "news@example.com");
            jail.set_env("SENDER_EMAIL", "news@example.com");

            let settings = Settings::from_figment(&Settings::figment()).unwrap();
            let err = settings.validate().unwrap_err();
            assert!(err.to_string().contains("SMTP_PASSWORD"));
            Ok(())
        });
    }

    #[test]
    fn test_unparseable_port() {
        Jail::expect_with(|jail| {
            required(jail);
            jail.set_env("SMTP_PORT", "not-a-port");

            assert!(Settings::from_figment(&Settings::figment()).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_text_values_are_not_parsed() {
        for password in ["123456", "true", "[s3cret,x]", "1.5"] {
            Jail::expect_with(|jail| {
                required(jail);
                jail.set_env("SMTP_PASSWORD", password);
                jail.set_env("SMTP_USERNAME", "4242");
                jail.set_env("SENDER_NAME", "2024");
                jail.set_env("HELO_NAME", "false");

                let settings = Settings::from_figment(&Settings::figment()).unwrap();

                assert_eq!(settings.smtp_password, password);
                assert_eq!(settings.smtp_username, "4242");
                assert_eq!(settings.sender_name, "2024");
                assert_eq!(settings.helo_name.as_deref(), Some("false"));
                assert!(settings.validate().is_ok());
                Ok(())
            });
        }
    }

    #[test]
    fn test_max_threads_alias() {
        Jail::expect_with(|jail| {
            required(jail);
            jail.set_env("MAX_THREADS", "6");

            let settings = Settings::from_figment(&Settings::figment()).unwrap();
            assert_eq!(settings.max_workers, 6);

            jail.set_env("MAX_WORKERS", "2");
            let settings = Settings::from_figment(&Settings::figment()).unwrap();
            assert_eq!(settings.max_workers, 2);
            Ok(())
        });
    }

    #[test]
    fn test_out_of_range_env_can_be_overridden() {
        Jail::expect_with(|jail| {
            required(jail);
            jail.set_env("MAX_WORKERS", "0");
            jail.set_env("THROTTLE", "-1");

            let mut settings = Settings::from_figment(&Settings::figment()).unwrap();
            assert!(settings.validate().is_err());

            settings.max_workers = 4;
            settings.throttle = 1.0;
            assert!(settings.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_reply_to_defaults_to_sender() {
        let settings = Settings {
            sender_name: "News".into(),
            sender_email: "news@example.com".into(),
            ..Settings::default()
        };
        let sender = settings.sender().unwrap();
        assert_eq!(sender.reply_to, sender.email);

        let settings = Settings {
            reply_to: Some("replies@example.com".into()),
            ..settings
        };
        let reply_to = settings.sender().unwrap().reply_to;
        assert_eq!(reply_to.as_str(), "replies@example.com");
    }

    #[test]
    fn test_validate_ranges() {
        let valid = Settings {
            smtp_username: "u".into(),
            smtp_password: "p".into(),
            sender_email: "news@example.com".into(),
            ..Settings::default()
        };
        assert!(valid.validate().is_ok());

        let bad = [
            Settings {
                retries: 0,
                ..valid.clone()
            },
            Settings {
                max_workers: 0,
                ..valid.clone()
            },
            Settings {
                throttle: -1.0,
                ..valid.clone()
            },
            Settings {
                sender_email: "nobody".into(),
                ..valid.clone()
            },
            Settings {
                reply_to: Some("x@y".into()),
                ..valid.clone()
            },
        ];
        for settings in bad {
            assert!(settings.validate().is_err(), "{settings:?}");
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = Settings {
            smtp_password: "hunter2".into(),
            ..Settings::default()
        };
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
