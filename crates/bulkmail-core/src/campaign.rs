//! The campaign send loop.
//!
//! By default messages go out one at a time in recipient order, with a
//! throttle pause between them. With more than one worker, up to that many
//! sends run concurrently, each on its own connection; results come back
//! through the join set and completion order is not guaranteed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bulkmail_smtp::{Connector, Mailer, OutboundMessage};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::message::MessageBuilder;
use crate::recipients::{Recipient, RecipientList};

/// Delivers one finished message.
pub trait Transport: Send + Sync + 'static {
    /// Returns true if the message was accepted.
    fn submit(&self, message: &OutboundMessage) -> impl Future<Output = bool> + Send;
}

impl<C: Connector + 'static> Transport for Mailer<C> {
    fn submit(&self, message: &OutboundMessage) -> impl Future<Output = bool> + Send {
        self.send(message)
    }
}

/// How a campaign is paced.
#[derive(Debug, Clone, Copy)]
pub struct CampaignOptions {
    /// Build every message but send none; each counts as sent.
    pub dry_run: bool,
    /// Pause between consecutive messages.
    pub throttle: Duration,
    /// Concurrent sends.
    pub max_workers: usize,
}

impl Default for CampaignOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            throttle: Duration::from_secs(1),
            max_workers: 1,
        }
    }
}

/// Running counts for one campaign.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    /// Messages accepted by the relay (or built, in a dry run).
    pub sent: usize,
    /// Messages that could not be built or delivered.
    pub failed: usize,
    /// Recipient rows dropped at load time.
    pub skipped: usize,
}

impl Tally {
    const fn record(&mut self, sent: bool) {
        if sent {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
    }

    fn record_join(&mut self, done: Result<bool, JoinError>) {
        match done {
            Ok(sent) => self.record(sent),
            Err(e) => {
                error!("send task failed: {e}");
                self.failed += 1;
            }
        }
    }
}

impl std::fmt::Display for Tally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sent, {} failed, {} skipped",
            self.sent, self.failed, self.skipped
        )
    }
}

/// Outcome of [`Campaign::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Counts up to the point the loop stopped.
    pub tally: Tally,
    /// Whether the loop was interrupted.
    pub cancelled: bool,
}

/// Builds and sends one message per recipient.
#[derive(Debug)]
pub struct Campaign<T> {
    transport: Arc<T>,
    builder: MessageBuilder,
    options: CampaignOptions,
}

impl<T: Transport> Campaign<T> {
    /// Creates a campaign over `transport`.
    #[must_use]
    pub fn new(transport: T, builder: MessageBuilder, options: CampaignOptions) -> Self {
        Self {
            transport: Arc::new(transport),
            builder,
            options,
        }
    }

    /// Returns the pacing options.
    #[must_use]
    pub const fn options(&self) -> &CampaignOptions {
        &self.options
    }

    /// Runs the campaign until every recipient is handled or `cancel` resolves.
    ///
    /// A cancelled run stops at the next await point; in-flight sends are
    /// aborted and left out of the tally.
    pub async fn run(
        &self,
        recipients: &RecipientList,
        cancel: impl Future<Output = ()>,
    ) -> Report {
        let mut tally = Tally {
            skipped: recipients.skipped,
            ..Tally::default()
        };
        let cancel = std::pin::pin!(cancel);

        let cancelled = if self.options.max_workers > 1 && !self.options.dry_run {
            self.run_pool(&recipients.recipients, &mut tally, cancel)
                .await
        } else {
            self.run_sequential(&recipients.recipients, &mut tally, cancel)
                .await
        };

        Report { tally, cancelled }
    }

    async fn run_sequential<F: Future<Output = ()>>(
        &self,
        recipients: &[Recipient],
        tally: &mut Tally,
        mut cancel: Pin<&mut F>,
    ) -> bool {
        for (index, recipient) in recipients.iter().enumerate() {
            if index > 0 && !self.options.dry_run && self.pause(cancel.as_mut()).await {
                return true;
            }

            let Some(message) = self.build(recipient, tally) else {
                continue;
            };

            if self.options.dry_run {
                info!("DRY RUN: Would send to {}", recipient.email);
                tally.sent += 1;
                continue;
            }

            tokio::select! {
                biased;
                () = cancel.as_mut() => return true,
                sent = self.transport.submit(&message) => tally.record(sent),
            }
        }
        false
    }

    async fn run_pool<F: Future<Output = ()>>(
        &self,
        recipients: &[Recipient],
        tally: &mut Tally,
        mut cancel: Pin<&mut F>,
    ) -> bool {
        let workers = Arc::new(Semaphore::new(self.options.max_workers));
        let mut tasks = JoinSet::new();
        info!(
            workers = self.options.max_workers,
            "sending with worker pool"
        );

        for (index, recipient) in recipients.iter().enumerate() {
            if index > 0 && self.pause(cancel.as_mut()).await {
                tasks.abort_all();
                return true;
            }

            let Some(message) = self.build(recipient, tally) else {
                continue;
            };

            let permit = tokio::select! {
                biased;
                () = cancel.as_mut() => {
                    tasks.abort_all();
                    return true;
                }
                permit = Arc::clone(&workers).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                break;
            };

            let transport = Arc::clone(&self.transport);
            tasks.spawn(async move {
                let sent = transport.submit(&message).await;
                drop(permit);
                sent
            });

            while let Some(done) = tasks.try_join_next() {
                tally.record_join(done);
            }
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.as_mut() => {
                    tasks.abort_all();
                    return true;
                }
                done = tasks.join_next() => match done {
                    Some(done) => tally.record_join(done),
                    None => return false,
                },
            }
        }
    }

    /// Sleeps for the throttle; returns true if cancelled meanwhile.
    async fn pause<F: Future<Output = ()>>(&self, cancel: Pin<&mut F>) -> bool {
        if self.options.throttle.is_zero() {
            return false;
        }
        tokio::select! {
            biased;
            () = cancel => true,
            () = tokio::time::sleep(self.options.throttle) => false,
        }
    }

    fn build(&self, recipient: &Recipient, tally: &mut Tally) -> Option<OutboundMessage> {
        match self.builder.build(recipient) {
            Ok(message) => Some(message),
            Err(e) => {
                error!(recipient = %recipient.email, "Cannot build message: {e}");
                tally.failed += 1;
                None
            }
        }
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
    clippy::similar_names
)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bulkmail_smtp::Address;
    use tokio::time::Instant;

    use crate::message::{Sender, Tracking};
    use crate::template::Templates;

    #[derive(Default)]
    struct FakeTransport {
        delivered: Mutex<Vec<String>>,
        reject: HashSet<String>,
        latency: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Transport for FakeTransport {
        fn submit(&self, message: &OutboundMessage) -> impl Future<Output = bool> + Send {
            let to = message.recipient().to_string();
            async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.latency).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if self.reject.contains(&to) {
                    return false;
                }
                self.delivered.lock().unwrap().push(to);
                true
            }
        }
    }

    fn builder(html: &str) -> MessageBuilder {
        let sender = Sender {
            name: "News".into(),
            email: Address::new("news@example.com").unwrap(),
            reply_to: Address::new("news@example.com").unwrap(),
        };
        let templates = Templates::from_sources(html, "Hi {{ recipient_name }}").unwrap();
        MessageBuilder::new(sender, "News", templates, Vec::new(), Tracking::default())
    }

    fn recipients(count: usize) -> RecipientList {
        RecipientList {
            recipients: (0..count)
                .map(|i| Recipient {
                    email: Address::new(format!("user{i}@example.org")).unwrap(),
                    name: format!("User {i}"),
                })
                .collect(),
            skipped: 1,
        }
    }

    fn options(throttle: u64, max_workers: usize) -> CampaignOptions {
        CampaignOptions {
            dry_run: false,
            throttle: Duration::from_secs(throttle),
            max_workers,
        }
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_keeps_order_and_throttles_between() {
        let campaign = Campaign::new(FakeTransport::default(), builder("<p></p>"), options(1, 1));
        let start = Instant::now();

        let report = campaign.run(&recipients(3), never()).await;

        assert!(!report.cancelled);
        assert_eq!(
            report.tally,
            Tally {
                sent: 3,
                failed: 0,
                skipped: 1
            }
        );
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(
            *campaign.transport.delivered.lock().unwrap(),
            vec!["user0@example.org", "user1@example.org", "user2@example.org"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted_and_the_run_continues() {
        let transport = FakeTransport {
            reject: HashSet::from(["user1@example.org".to_string()]),
            ..FakeTransport::default()
        };
        let campaign = Campaign::new(transport, builder("<p></p>"), options(0, 1));

        let report = campaign.run(&recipients(3), never()).await;

        assert_eq!(report.tally.to_string(), "2 sent, 1 failed, 1 skipped");
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_failure_fails_one_recipient() {
        let html =
            "{% if recipient_name == \"User 1\" %}{{ recipient_name|no_such_filter }}{% endif %}";
        let campaign = Campaign::new(FakeTransport::default(), builder(html), options(0, 1));

        let report = campaign.run(&recipients(3), never()).await;

        assert_eq!(report.tally.sent, 2);
        assert_eq!(report.tally.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_sends_nothing() {
        let campaign = Campaign::new(
            FakeTransport::default(),
            builder("<p></p>"),
            CampaignOptions {
                dry_run: true,
                ..options(5, 4)
            },
        );
        let start = Instant::now();

        let report = campaign.run(&recipients(3), never()).await;

        assert_eq!(report.tally.sent, 3);
        assert!(campaign.transport.delivered.lock().unwrap().is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounds_concurrency() {
        let transport = FakeTransport {
            latency: Duration::from_secs(1),
            ..FakeTransport::default()
        };
        let campaign = Campaign::new(transport, builder("<p></p>"), options(0, 2));
        let start = Instant::now();

        let report = campaign.run(&recipients(4), never()).await;

        assert_eq!(report.tally.sent, 4);
        assert_eq!(campaign.transport.peak.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        let delivered: HashSet<_> = campaign
            .transport
            .delivered
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect();
        assert_eq!(delivered.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_at_next_await() {
        let campaign = Campaign::new(FakeTransport::default(), builder("<p></p>"), options(1, 1));

        let cancel = tokio::time::sleep(Duration::from_millis(1500));
        let report = campaign.run(&recipients(5), cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.tally.sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_pool() {
        let transport = FakeTransport {
            latency: Duration::from_secs(10),
            ..FakeTransport::default()
        };
        let campaign = Campaign::new(transport, builder("<p></p>"), options(0, 2));

        let report = campaign
            .run(&recipients(4), tokio::time::sleep(Duration::from_secs(1)))
            .await;

        assert!(report.cancelled);
        assert_eq!(report.tally.sent, 0);
    }
}
