//! Builds the RFC 5322 message sent to each recipient.

use std::fmt::Write;

use bulkmail_smtp::{Address, OutboundMessage};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::Result;
use crate::links::Link;
use crate::recipients::Recipient;
use crate::template::{CHARSET, TemplateContext, Templates};

/// Separator between the plain and HTML parts.
pub const BOUNDARY: &str = "=_bulkmail_alternative_BOUNDARY";

/// Who the campaign is sent as.
#[derive(Debug, Clone)]
pub struct Sender {
    /// Display name in the `From` header.
    pub name: String,
    /// Envelope and header sender.
    pub email: Address,
    /// Address in the `Reply-To` header.
    pub reply_to: Address,
}

/// Open and click tracking switches.
#[derive(Debug, Clone, Default)]
pub struct Tracking {
    /// Ask templates to embed an open pixel.
    pub track_opens: bool,
    /// Tracking host handed to templates.
    pub domain: Option<String>,
}

/// Generates a `Message-ID` with 16 random alphanumerics at `domain`.
#[must_use]
pub fn generate_message_id(domain: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("<{token}@{domain}>")
}

/// Produces one [`OutboundMessage`] per recipient.
///
/// Headers are `From`, `To`, `Reply-To`, `Subject`, `Date`, `Message-ID`
/// and `MIME-Version`, followed by a `multipart/alternative` body with a
/// `text/plain` part and then a `text/html` part.
#[derive(Debug)]
pub struct MessageBuilder {
    sender: Sender,
    subject: String,
    templates: Templates,
    links: Vec<Link>,
    tracking: Tracking,
}

impl MessageBuilder {
    /// Creates a builder for one campaign.
    #[must_use]
    pub fn new(
        sender: Sender,
        subject: impl Into<String>,
        templates: Templates,
        links: Vec<Link>,
        tracking: Tracking,
    ) -> Self {
        Self {
            sender,
            subject: single_line(&subject.into()),
            templates,
            links,
            tracking,
        }
    }

    /// Returns the sender identity.
    #[must_use]
    pub const fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Renders and assembles the message for `recipient`.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn build(&self, recipient: &Recipient) -> Result<OutboundMessage> {
        let message_id = generate_message_id(self.sender.email.domain());

        let ctx = TemplateContext {
            recipient_email: recipient.email.as_str(),
            recipient_name: &recipient.name,
            subject: &self.subject,
            links: &self.links,
            sender_name: &self.sender.name,
            sender_email: self.sender.email.as_str(),
            message_id: &message_id,
            track_opens: self.tracking.track_opens,
            tracking_domain: self.tracking.domain.as_deref().unwrap_or_default(),
            charset: CHARSET,
        };
        let body = self.templates.render(&ctx)?;

        let mut message = String::new();

        let _ = writeln!(message, "From: {}\r", self.from_header());
        let _ = writeln!(message, "To: {}\r", recipient.email);
        let _ = writeln!(message, "Reply-To: {}\r", self.sender.reply_to);
        let _ = writeln!(message, "Subject: {}\r", self.subject);
        let _ = writeln!(message, "Date: {}\r", chrono::Local::now().to_rfc2822());
        let _ = writeln!(message, "Message-ID: {message_id}\r");
        message.push_str("MIME-Version: 1.0\r\n");
        let _ = writeln!(
            message,
            "Content-Type: multipart/alternative; boundary=\"{BOUNDARY}\"\r"
        );
        message.push_str("\r\n");

        push_part(&mut message, "text/plain", &body.text);
        push_part(&mut message, "text/html", &body.html);
        let _ = writeln!(message, "--{BOUNDARY}--\r");

        Ok(OutboundMessage::new(recipient.email.clone(), message))
    }

    fn from_header(&self) -> String {
        let name = single_line(&self.sender.name);
        if name.trim().is_empty() {
            self.sender.email.to_string()
        } else {
            format!("{name} <{}>", self.sender.email)
        }
    }
}

fn push_part(message: &mut String, content_type: &str, body: &str) {
    let _ = writeln!(message, "--{BOUNDARY}\r");
    let _ = writeln!(message, "Content-Type: {content_type}; charset={CHARSET}\r");
    message.push_str("\r\n");
    for line in body.lines() {
        message.push_str(line);
        message.push_str("\r\n");
    }
    message.push_str("\r\n");
}

// Header values must not smuggle in extra header lines.
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
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

    fn builder(subject: &str) -> MessageBuilder {
        let templates = Templates::from_sources(
            "<p>Hello {{ recipient_name }}</p>\n<p>{{ message_id }}</p>",
            "Hello {{ recipient_name }}\n\
             {% for link in links %}{{ link.text }}: {{ link.url }}\n{% endfor %}",
        )
        .unwrap();
        let sender = Sender {
            name: "News Team".into(),
            email: Address::new("news@example.com").unwrap(),
            reply_to: Address::new("replies@example.com").unwrap(),
        };
        let links = vec![Link {
            url: "https://example.com".into(),
            text: "Home".into(),
        }];
        MessageBuilder::new(sender, subject, templates, links, Tracking::default())
    }

    fn recipient() -> Recipient {
        Recipient {
            email: Address::new("alice@example.org").unwrap(),
            name: "Alice".into(),
        }
    }

    fn text(message: &OutboundMessage) -> String {
        String::from_utf8(message.payload().to_vec()).unwrap()
    }

    #[test]
    fn test_message_id_shape() {
        let id = generate_message_id("example.com");
        assert!(id.starts_with('<') && id.ends_with("@example.com>"));
        let token = &id[1..id.find('@').unwrap()];
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_message_id("example.com"));
    }

    #[test]
    fn test_headers() {
        let message = builder("Spring news").build(&recipient()).unwrap();
        let payload = text(&message);

        assert_eq!(message.recipient().as_str(), "alice@example.org");
        assert!(payload.starts_with("From: News Team <news@example.com>\r\n"));
        assert!(payload.contains("\r\nTo: alice@example.org\r\n"));
        assert!(payload.contains("\r\nReply-To: replies@example.com\r\n"));
        assert!(payload.contains("\r\nSubject: Spring news\r\n"));
        assert!(payload.contains("\r\nDate: "));
        assert!(payload.contains("\r\nMessage-ID: <"));
        assert!(payload.contains("@example.com>\r\nMIME-Version: 1.0\r\n"));
    }

    #[test]
    fn test_body_parts_in_order_with_crlf() {
        let payload = text(&builder("Hi").build(&recipient()).unwrap());

        let plain = payload
            .find("Content-Type: text/plain; charset=utf-8")
            .unwrap();
        let html = payload
            .find("Content-Type: text/html; charset=utf-8")
            .unwrap();
        assert!(plain < html);
        assert!(payload.contains("Hello Alice\r\nHome: https://example.com\r\n"));
        assert!(payload.contains("<p>Hello Alice</p>\r\n"));
        assert!(payload.ends_with(&format!("--{BOUNDARY}--\r\n")));
        assert!(!payload.replace("\r\n", "").contains('\n'));
    }

    #[test]
    fn test_message_id_is_shared_with_template() {
        let payload = text(&builder("Hi").build(&recipient()).unwrap());

        let header = payload
            .lines()
            .find_map(|line| line.strip_prefix("Message-ID: "))
            .unwrap()
            .trim_end();
        assert!(payload.contains(&format!("<p>{header}</p>")));
    }

    #[test]
    fn test_subject_cannot_inject_headers() {
        let payload = text(
            &builder("Hi\r\nBcc: victim@example.com")
                .build(&recipient())
                .unwrap(),
        );

        assert!(payload.contains("\r\nSubject: Hi Bcc: victim@example.com\r\n"));
        assert!(!payload.contains("\r\nBcc:"));
    }
}
