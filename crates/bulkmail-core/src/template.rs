//! Per-recipient body rendering with minijinja.
//!
//! A template set is a pair of files, `<name>.html` and `<name>.txt`, read
//! once at startup. Both are rendered with the same [`TemplateContext`].

use std::path::Path;

use minijinja::{AutoEscape, Environment};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::links::Link;

/// Template set used when none is named.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Charset declared in the body parts and passed to templates.
pub const CHARSET: &str = "utf-8";

/// Values available to both templates.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext<'a> {
    /// Recipient address.
    pub recipient_email: &'a str,
    /// Recipient display name.
    pub recipient_name: &'a str,
    /// Message subject.
    pub subject: &'a str,
    /// Campaign links, tracked if click tracking is on.
    pub links: &'a [Link],
    /// Sender display name.
    pub sender_name: &'a str,
    /// Sender address.
    pub sender_email: &'a str,
    /// `Message-ID` header value, angle brackets included.
    pub message_id: &'a str,
    /// Whether the HTML part should embed an open-tracking pixel.
    pub track_opens: bool,
    /// Tracking host, empty when unset.
    pub tracking_domain: &'a str,
    /// Body charset.
    pub charset: &'a str,
}

/// Rendered text and HTML bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    /// `text/plain` part.
    pub text: String,
    /// `text/html` part.
    pub html: String,
}

/// A loaded template pair.
#[derive(Debug)]
pub struct Templates {
    env: Environment<'static>,
    html: String,
    text: String,
}

impl Templates {
    /// Reads `<name>.html` and `<name>.txt` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateNotFound`] if either file is missing, or a
    /// template error if one does not compile.
    pub fn load(dir: impl AsRef<Path>, name: Option<&str>) -> Result<Self> {
        let dir = dir.as_ref();
        let name = name.unwrap_or(DEFAULT_TEMPLATE);

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let html = format!("{name}.html");
        let text = format!("{name}.txt");
        for file in [&html, &text] {
            let source = read_template(&dir.join(file))?;
            env.add_template_owned(file.clone(), source)?;
        }

        debug!(dir = %dir.display(), %name, "templates loaded");
        Ok(Self { env, html, text })
    }

    /// Builds a template set from in-memory sources.
    ///
    /// # Errors
    ///
    /// Returns a template error if either source does not compile.
    pub fn from_sources(html: &str, text: &str) -> Result<Self> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template_owned("inline.html", html.to_string())?;
        env.add_template_owned("inline.txt", text.to_string())?;
        Ok(Self {
            env,
            html: "inline.html".into(),
            text: "inline.txt".into(),
        })
    }

    /// Renders both bodies for one recipient.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails, for example on an
    /// undefined filter.
    pub fn render(&self, ctx: &TemplateContext<'_>) -> Result<RenderedBody> {
        let text = self.env.get_template(&self.text)?.render(ctx)?;
        let html = self.env.get_template(&self.html)?.render(ctx)?;
        Ok(RenderedBody { text, html })
    }
}

fn read_template(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(source) => Ok(source),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::TemplateNotFound {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(Error::Read {
            path: path.to_path_buf(),
            source,
        }),
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

    fn context<'a>(links: &'a [Link]) -> TemplateContext<'a> {
        TemplateContext {
            recipient_email: "alice@example.com",
            recipient_name: "Alice",
            subject: "Spring news",
            links,
            sender_name: "News Team",
            sender_email: "news@example.com",
            message_id: "<abc@example.com>",
            track_opens: true,
            tracking_domain: "track.example.com",
            charset: CHARSET,
        }
    }

    fn write(dir: &std::path::Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let html = "<p>Hi {{ recipient_name }}</p>";
        let text = "Hi {{ recipient_name }}";
        write(dir.path(), "default.html", html);
        write(dir.path(), "default.txt", text);

        let templates = Templates::load(dir.path(), None).unwrap();
        let body = templates.render(&context(&[])).unwrap();

        assert_eq!(body.text, "Hi Alice");
        assert_eq!(body.html, "<p>Hi Alice</p>");
    }

    #[test]
    fn test_missing_template_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "promo.html", "<p></p>");

        let err = Templates::load(dir.path(), Some("promo")).unwrap_err();
        match err {
            Error::TemplateNotFound { path } => assert!(path.ends_with("promo.txt")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_links_and_tracking_in_context() {
        let templates = Templates::from_sources(
            "{% for link in links %}<a href=\"{{ link.url }}\">{{ link.text }}</a>{% endfor %}\
             {% if track_opens %}<img src=\"http://{{ tracking_domain }}/open?id={{ message_id }}\">{% endif %}",
            "{{ subject }} for {{ recipient_email }} ({{ charset }})",
        )
        .unwrap();
        let links = [Link {
            url: "http://track.example.com/redirect?to=https://example.com/?a=1&b=2".into(),
            text: "Deals".into(),
        }];

        let body = templates.render(&context(&links)).unwrap();

        assert_eq!(body.text, "Spring news for alice@example.com (utf-8)");
        assert!(body.html.contains(
            "<a href=\"http://track.example.com/redirect?to=https://example.com/?a=1&b=2\">Deals</a>"
        ));
        assert!(body.html.contains("/open?id=<abc@example.com>"));
    }

    #[test]
    fn test_syntax_error_fails_at_load() {
        assert!(Templates::from_sources("{% if %}", "").is_err());
    }
}
