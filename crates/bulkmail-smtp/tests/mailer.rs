//! Integration tests for whole-session retry and pacing.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use bulkmail_smtp::{ErrorKind, Mailer, SessionState};
use common::{MockConnector, Script, config, message};

const PAYLOAD: &str = "Subject: retry\r\n\r\nbody\r\n";

#[tokio::test(start_paused = true)]
async fn test_exhausted_attempts_sleep_between_not_after() {
    let connector = MockConnector::new().refuse(3);
    let log = connector.log();
    let mailer = Mailer::with_connector(config(587).max_attempts(3).build().unwrap(), connector);
    let start = Instant::now();

    let delivery = mailer.deliver(&message(PAYLOAD)).await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "elapsed {elapsed:?}");
    assert_eq!(delivery.attempts, 3);
    assert_eq!(log.connects(), 3);
    assert_eq!(
        delivery.error.as_ref().map(bulkmail_smtp::Error::kind),
        Some(ErrorKind::Connection)
    );
    assert_eq!(delivery.failed_in, Some(SessionState::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn test_second_attempt_starts_from_scratch() {
    let busy = Script::new().reply("RCPT", "421 4.7.0 try again later\r\n");
    let connector = MockConnector::new().then(busy);
    let log = connector.log();
    let mailer = Mailer::with_connector(config(587).build().unwrap(), connector);
    let start = Instant::now();

    let delivery = mailer.deliver(&message(PAYLOAD)).await;

    assert!(delivery.is_delivered());
    assert_eq!(delivery.attempts, 2);
    assert_eq!(start.elapsed(), Duration::from_secs(2));

    let seen = log.keys();
    let first_close = seen.iter().position(|k| k == "closed").unwrap();
    assert_eq!(seen[first_close - 1], "RCPT");
    assert_eq!(
        &seen[first_close + 1..first_close + 4],
        &["connect", "greeting", "EHLO"]
    );
    assert_eq!(seen.iter().filter(|k| *k == "BODY").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credentials_are_retried_by_default() {
    let connector = MockConnector::with_default(
        Script::new().reply("PASS", "535 5.7.8 Authentication credentials invalid\r\n"),
    );
    let log = connector.log();
    let mailer = Mailer::with_connector(config(587).build().unwrap(), connector);

    let delivery = mailer.deliver(&message(PAYLOAD)).await;

    assert_eq!(delivery.attempts, 3);
    assert_eq!(log.connects(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credentials_stop_when_auth_retry_disabled() {
    let connector = MockConnector::with_default(
        Script::new().reply("PASS", "535 5.7.8 Authentication credentials invalid\r\n"),
    );
    let log = connector.log();
    let mailer = Mailer::with_connector(
        config(587).retry_auth_failures(false).build().unwrap(),
        connector,
    );
    let start = Instant::now();

    let delivery = mailer.deliver(&message(PAYLOAD)).await;

    assert_eq!(delivery.attempts, 1);
    assert_eq!(log.connects(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(
        delivery.error.as_ref().map(bulkmail_smtp::Error::kind),
        Some(ErrorKind::Authentication)
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_success() {
    let connector = MockConnector::new().then(Script::new().hang("DATA"));
    let log = connector.log();
    let mailer = Mailer::with_connector(config(2525).build().unwrap(), connector);
    let start = Instant::now();

    assert!(mailer.send(&message(PAYLOAD)).await);
    // One 5s timeout plus one 2s pause.
    assert_eq!(start.elapsed(), Duration::from_secs(7));
    assert_eq!(log.connects(), 2);
}

#[tokio::test]
async fn test_single_attempt_never_sleeps() {
    let connector = MockConnector::new().refuse(1);
    let mailer = Mailer::with_connector(config(587).max_attempts(1).build().unwrap(), connector);

    assert!(!mailer.send(&message(PAYLOAD)).await);
}

#[tokio::test(start_paused = true)]
async fn test_shared_mailer_opens_one_session_per_message() {
    let connector = MockConnector::new();
    let log = connector.log();
    let config = config(587).build().unwrap();
    let mailer = Arc::new(Mailer::with_connector(config, connector));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let mailer = Arc::clone(&mailer);
        handles.push(tokio::spawn(async move {
            mailer.send(&message(PAYLOAD)).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(log.connects(), 4);
    assert_eq!(log.keys().iter().filter(|k| *k == "closed").count(), 4);
}
