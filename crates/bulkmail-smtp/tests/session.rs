//! Integration tests for a single SMTP session against the mock relay.
//!
//! Each test runs one attempt through [`Mailer`] and checks what the relay
//! saw, in order.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use base64::Engine;
use tokio::time::Instant;

use bulkmail_smtp::{Error, ErrorKind, Mailer, ReplyCode, SessionState};
use common::{Event, MockConnector, PASSWORD, Script, USERNAME, config, keys, message};

const PAYLOAD: &str = "Subject: hello\r\n\r\nHi there\r\n";

fn mailer(port: u16, connector: MockConnector) -> Mailer<MockConnector> {
    Mailer::with_connector(config(port).max_attempts(1).build().unwrap(), connector)
}

#[tokio::test]
async fn test_submission_port_upgrades_before_auth() {
    let connector = MockConnector::new();
    let log = connector.log();

    let delivery = mailer(587, connector).deliver(&message(PAYLOAD)).await;

    assert!(delivery.is_delivered());
    assert_eq!(delivery.state(), SessionState::Closed);
    assert_eq!(delivery.attempts, 1);
    assert_eq!(
        log.keys(),
        keys(&[
            "connect", "greeting", "EHLO", "STARTTLS", "tls", "EHLO", "AUTH", "USER", "PASS",
            "MAIL", "RCPT", "DATA", "BODY", "QUIT", "closed",
        ])
    );
    assert_eq!(
        log.events()[0],
        Event::Connect {
            host: "relay.test".into(),
            port: 587,
        }
    );
}

#[tokio::test]
async fn test_port_25_also_requires_starttls() {
    let connector = MockConnector::new();
    let log = connector.log();

    assert!(mailer(25, connector).send(&message(PAYLOAD)).await);
    assert!(log.keys().contains(&"STARTTLS".to_string()));
}

#[tokio::test]
async fn test_implicit_tls_encrypts_before_greeting() {
    let connector = MockConnector::new();
    let log = connector.log();

    assert!(mailer(465, connector).send(&message(PAYLOAD)).await);
    assert_eq!(
        log.keys(),
        keys(&[
            "connect", "tls", "greeting", "EHLO", "AUTH", "USER", "PASS", "MAIL", "RCPT", "DATA",
            "BODY", "QUIT", "closed",
        ])
    );
}

#[tokio::test]
async fn test_other_ports_stay_plaintext() {
    let connector = MockConnector::new();
    let log = connector.log();

    assert!(mailer(2525, connector).send(&message(PAYLOAD)).await);
    let seen = log.keys();
    assert!(!seen.contains(&"tls".to_string()));
    assert!(!seen.contains(&"STARTTLS".to_string()));
    assert_eq!(seen.first().map(String::as_str), Some("connect"));
    assert_eq!(seen.get(1).map(String::as_str), Some("greeting"));
}

#[tokio::test]
async fn test_wire_lines() {
    let connector = MockConnector::new();
    let log = connector.log();

    assert!(mailer(2525, connector).send(&message(PAYLOAD)).await);

    let engine = base64::engine::general_purpose::STANDARD;
    assert_eq!(log.line("EHLO").unwrap(), "EHLO client.test");
    assert_eq!(log.line("AUTH").unwrap(), "AUTH LOGIN");
    assert_eq!(log.line("USER").unwrap(), engine.encode(USERNAME));
    assert_eq!(log.line("PASS").unwrap(), engine.encode(PASSWORD));
    assert_eq!(log.line("MAIL").unwrap(), "MAIL FROM:<news@example.com>");
    assert_eq!(log.line("RCPT").unwrap(), "RCPT TO:<reader@example.org>");
    assert_eq!(log.line("BODY").unwrap(), PAYLOAD);
}

#[tokio::test]
async fn test_body_is_dot_stuffed_on_the_wire() {
    let connector = MockConnector::new();
    let log = connector.log();
    let payload = "Subject: dots\n\n.hidden line\nplain\n";

    assert!(mailer(2525, connector).send(&message(payload)).await);
    assert_eq!(
        log.line("BODY").unwrap(),
        "Subject: dots\r\n\r\n..hidden line\r\nplain\r\n"
    );
}

#[tokio::test]
async fn test_rejected_recipient_stops_the_session() {
    let connector =
        MockConnector::with_default(Script::new().reply("RCPT", "550 5.1.1 no such user\r\n"));
    let log = connector.log();

    let delivery = mailer(587, connector).deliver(&message(PAYLOAD)).await;

    assert!(!delivery.is_delivered());
    assert_eq!(delivery.state(), SessionState::Failed);
    assert_eq!(delivery.failed_in, Some(SessionState::Authenticated));
    assert!(matches!(
        delivery.error,
        Some(Error::UnexpectedReply { code, .. }) if code == ReplyCode::MAILBOX_UNAVAILABLE
    ));
    assert_eq!(
        log.keys(),
        keys(&[
            "connect", "greeting", "EHLO", "STARTTLS", "tls", "EHLO", "AUTH", "USER", "PASS",
            "MAIL", "RCPT", "closed",
        ])
    );
}

#[tokio::test]
async fn test_refused_starttls_never_upgrades() {
    let connector = MockConnector::with_default(
        Script::new().reply("STARTTLS", "454 4.7.0 TLS not available\r\n"),
    );
    let log = connector.log();

    let delivery = mailer(587, connector).deliver(&message(PAYLOAD)).await;

    assert_eq!(delivery.failed_in, Some(SessionState::Greeted));
    assert_eq!(
        delivery.error.as_ref().map(Error::kind),
        Some(ErrorKind::Protocol)
    );
    assert_eq!(
        log.keys(),
        keys(&["connect", "greeting", "EHLO", "STARTTLS", "closed"])
    );
}

#[tokio::test]
async fn test_plaintext_injected_after_starttls_is_rejected() {
    let connector = MockConnector::with_default(
        Script::new().reply("STARTTLS", "220 2.0.0 go ahead\r\n250 injected\r\n"),
    );
    let log = connector.log();

    let delivery = mailer(587, connector).deliver(&message(PAYLOAD)).await;

    assert!(matches!(delivery.error, Some(Error::Protocol(_))));
    assert!(!log.keys().contains(&"tls".to_string()));
}

#[tokio::test]
async fn test_greeting_other_than_220_fails_in_connected() {
    let connector = MockConnector::with_default(
        Script::new().reply("GREETING", "554 5.3.2 not accepting mail\r\n"),
    );
    let log = connector.log();

    let delivery = mailer(587, connector).deliver(&message(PAYLOAD)).await;

    assert_eq!(delivery.failed_in, Some(SessionState::Connected));
    assert_eq!(log.keys(), keys(&["connect", "greeting", "closed"]));
}

#[tokio::test]
async fn test_peer_close_is_connection_closed() {
    let connector = MockConnector::with_default(Script::new().close("MAIL"));
    let log = connector.log();

    let delivery = mailer(2525, connector).deliver(&message(PAYLOAD)).await;

    assert!(matches!(delivery.error, Some(Error::ConnectionClosed)));
    assert_eq!(delivery.failed_in, Some(SessionState::Authenticated));
    assert_eq!(log.keys().last().map(String::as_str), Some("closed"));
    assert!(!log.keys().contains(&"RCPT".to_string()));
}

#[tokio::test]
async fn test_bad_credentials_fail_in_auth() {
    let connector = MockConnector::with_default(
        Script::new().reply("PASS", "535 5.7.8 Authentication credentials invalid\r\n"),
    );

    let delivery = mailer(2525, connector).deliver(&message(PAYLOAD)).await;

    assert_eq!(
        delivery.error.as_ref().map(Error::kind),
        Some(ErrorKind::Authentication)
    );
    assert_eq!(delivery.failed_in, Some(SessionState::Greeted));
}

#[tokio::test(start_paused = true)]
async fn test_silent_relay_times_out() {
    let connector = MockConnector::with_default(Script::new().hang("BODY"));
    let log = connector.log();
    let start = Instant::now();

    let delivery = mailer(2525, connector).deliver(&message(PAYLOAD)).await;

    assert!(matches!(
        delivery.error,
        Some(Error::Timeout { during: "end of data", .. })
    ));
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(log.keys().last().map(String::as_str), Some("closed"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_greeting_times_out() {
    let connector = MockConnector::with_default(Script::new().hang("GREETING"));

    let delivery = mailer(587, connector).deliver(&message(PAYLOAD)).await;

    assert!(matches!(
        delivery.error,
        Some(Error::Timeout { during: "greeting", .. })
    ));
    assert_eq!(delivery.failed_in, Some(SessionState::Connected));
}

#[tokio::test]
async fn test_failed_quit_still_delivers() {
    let connector =
        MockConnector::with_default(Script::new().reply("QUIT", "500 5.5.1 what\r\n"));
    let log = connector.log();

    let delivery = mailer(587, connector).deliver(&message(PAYLOAD)).await;

    assert!(delivery.is_delivered());
    assert_eq!(log.connects(), 1);
}
