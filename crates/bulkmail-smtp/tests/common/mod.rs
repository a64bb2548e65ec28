//! Scripted in-memory relay shared by the integration tests.
//!
//! The relay answers each client line as it is written, so the exact order
//! of commands, TLS upgrades and closes can be checked afterwards through
//! the shared event log.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use bulkmail_smtp::{
    Address, Connector, Error, OutboundMessage, Result, SessionConfig, SessionConfigBuilder,
};

/// Something the relay observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A connection was opened.
    Connect { host: String, port: u16 },
    /// The stream was upgraded to TLS.
    Tls,
    /// The greeting was read by the client.
    Greeting,
    /// A client line, keyed by verb (`USER`/`PASS` for AUTH LOGIN lines and
    /// `BODY` for the message data).
    Command { key: String, line: String },
    /// The stream was dropped.
    Closed,
}

impl Event {
    fn key(&self) -> String {
        match self {
            Self::Connect { .. } => "connect".into(),
            Self::Tls => "tls".into(),
            Self::Greeting => "greeting".into(),
            Self::Command { key, .. } => key.clone(),
            Self::Closed => "closed".into(),
        }
    }
}

/// Shared record of everything every connection did.
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    /// Event keys in order, e.g. `["connect", "greeting", "EHLO", ...]`.
    pub fn keys(&self) -> Vec<String> {
        self.events().iter().map(Event::key).collect()
    }

    pub fn connects(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Connect { .. }))
            .count()
    }

    /// The raw line recorded for the first command with `key`.
    pub fn line(&self, key: &str) -> Option<String> {
        self.events().into_iter().find_map(|e| match e {
            Event::Command { key: k, line } if k == key => Some(line),
            _ => None,
        })
    }
}

/// How the relay reacts to a command.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send these reply bytes.
    Reply(String),
    /// Never answer.
    Hang,
    /// Close the stream without answering.
    Close,
}

/// Per-connection overrides of the default replies.
#[derive(Debug, Clone, Default)]
pub struct Script(HashMap<String, Action>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, key: &str, reply: &str) -> Self {
        self.0.insert(key.into(), Action::Reply(reply.into()));
        self
    }

    pub fn hang(mut self, key: &str) -> Self {
        self.0.insert(key.into(), Action::Hang);
        self
    }

    pub fn close(mut self, key: &str) -> Self {
        self.0.insert(key.into(), Action::Close);
        self
    }

    fn action(&self, key: &str) -> Action {
        self.0
            .get(key)
            .cloned()
            .unwrap_or_else(|| Action::Reply(default_reply(key).into()))
    }
}

fn default_reply(key: &str) -> &'static str {
    match key {
        "GREETING" => "220 relay.test ESMTP ready\r\n",
        "EHLO" => "250-relay.test\r\n250-STARTTLS\r\n250-SIZE 10240000\r\n250 AUTH LOGIN PLAIN\r\n",
        "STARTTLS" => "220 2.0.0 Ready to start TLS\r\n",
        "AUTH" => "334 VXNlcm5hbWU6\r\n",
        "USER" => "334 UGFzc3dvcmQ6\r\n",
        "PASS" => "235 2.7.0 Authentication successful\r\n",
        "MAIL" | "RCPT" => "250 2.1.0 Ok\r\n",
        "DATA" => "354 End data with <CR><LF>.<CR><LF>\r\n",
        "BODY" => "250 2.0.0 Ok: queued\r\n",
        "QUIT" => "221 2.0.0 Bye\r\n",
        _ => "500 5.5.2 Command not recognized\r\n",
    }
}

/// In-memory stream that plays the relay side of one connection.
pub struct MockStream {
    script: Script,
    log: Log,
    outbox: VecDeque<u8>,
    inbox: Vec<u8>,
    greeted: bool,
    auth_step: u8,
    in_data: bool,
    body: String,
    hung: bool,
    closed: bool,
}

impl MockStream {
    fn new(script: Script, log: Log) -> Self {
        Self {
            script,
            log,
            outbox: VecDeque::new(),
            inbox: Vec::new(),
            greeted: false,
            auth_step: 0,
            in_data: false,
            body: String::new(),
            hung: false,
            closed: false,
        }
    }

    fn respond(&mut self, key: &str) {
        match self.script.action(key) {
            Action::Reply(reply) => self.outbox.extend(reply.into_bytes()),
            Action::Hang => self.hung = true,
            Action::Close => self.closed = true,
        }
    }

    fn record(&self, key: &str, line: String) {
        self.log.push(Event::Command {
            key: key.into(),
            line,
        });
    }

    fn handle_line(&mut self, line: String) {
        if self.in_data {
            if line == "." {
                self.in_data = false;
                let body = std::mem::take(&mut self.body);
                self.record("BODY", body);
                self.respond("BODY");
            } else {
                self.body.push_str(&line);
                self.body.push_str("\r\n");
            }
            return;
        }

        let key = match self.auth_step {
            1 => {
                self.auth_step = 2;
                "USER".to_string()
            }
            2 => {
                self.auth_step = 0;
                "PASS".to_string()
            }
            _ => line
                .split([' ', ':'])
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase(),
        };

        self.record(&key, line);
        match key.as_str() {
            "AUTH" => self.auth_step = 1,
            "DATA" => self.in_data = true,
            _ => {}
        }
        self.respond(&key);
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if !this.greeted {
            this.greeted = true;
            this.log.push(Event::Greeting);
            this.respond("GREETING");
        }

        if this.outbox.is_empty() {
            // A hung relay stays pending until the client's timeout fires.
            return if this.closed && !this.hung {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            };
        }

        let n = this.outbox.len().min(buf.remaining());
        let chunk: Vec<u8> = this.outbox.drain(..n).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        this.inbox.extend_from_slice(buf);
        while let Some(pos) = this.inbox.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = this.inbox.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw)
                .trim_end_matches(['\r', '\n'])
                .to_string();
            this.handle_line(line);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.log.push(Event::Closed);
    }
}

/// Connector handing out [`MockStream`]s.
///
/// Each connection takes the next queued script, falling back to the
/// default one once the queue is empty.
pub struct MockConnector {
    log: Log,
    default: Script,
    queued: Mutex<VecDeque<Script>>,
    refuse: Mutex<usize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::with_default(Script::new())
    }

    pub fn with_default(default: Script) -> Self {
        Self {
            log: Log::default(),
            default,
            queued: Mutex::new(VecDeque::new()),
            refuse: Mutex::new(0),
        }
    }

    /// Queues a script for the next unscripted connection.
    pub fn then(self, script: Script) -> Self {
        self.queued.lock().unwrap().push_back(script);
        self
    }

    /// Refuses the next `count` connection attempts.
    pub fn refuse(self, count: usize) -> Self {
        *self.refuse.lock().unwrap() = count;
        self
    }

    pub fn log(&self) -> Log {
        self.log.clone()
    }
}

impl Connector for MockConnector {
    type Stream = MockStream;

    async fn connect(&self, host: &str, port: u16) -> Result<MockStream> {
        self.log.push(Event::Connect {
            host: host.to_string(),
            port,
        });

        {
            let mut refuse = self.refuse.lock().unwrap();
            if *refuse > 0 {
                *refuse -= 1;
                return Err(Error::Connect {
                    addr: format!("{host}:{port}"),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                });
            }
        }

        let script = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        Ok(MockStream::new(script, self.log.clone()))
    }

    async fn secure(&self, stream: MockStream, _host: &str) -> Result<MockStream> {
        self.log.push(Event::Tls);
        Ok(stream)
    }
}

pub const USERNAME: &str = "news@example.com";
pub const PASSWORD: &str = "app-password";

/// Session config aimed at the mock relay.
pub fn config(port: u16) -> SessionConfigBuilder {
    SessionConfig::builder("relay.test", Address::new("news@example.com").unwrap())
        .port(port)
        .credentials(USERNAME, PASSWORD)
        .helo_name("client.test")
        .timeout(Duration::from_secs(5))
        .retry_delay(Duration::from_secs(2))
}

/// A short message to `reader@example.org`.
pub fn message(payload: &str) -> OutboundMessage {
    OutboundMessage::new(
        Address::new("reader@example.org").unwrap(),
        payload.as_bytes().to_vec(),
    )
}

/// Converts string literals for comparison with [`Log::keys`].
pub fn keys(expected: &[&str]) -> Vec<String> {
    expected.iter().map(ToString::to_string).collect()
}
