//! Notification envelope and the dispatch seam.
//!
//! A [`Notification`] is sink-agnostic: a title, a [`NotificationKind`], and an
//! ordered list of labelled fields. Each sink renders it into its native
//! payload. Field keys prefixed with `-` are full-width; all others are short.
//! Destination overrides are keyed by sink type, so a Slack webhook never
//! reaches a Telegram sink.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{RequestContext, TraceId};

/// Type tag of the Slack webhook sink.
pub const SLACK_SINK: &str = "slack";

/// Type tag of the Telegram bot sink.
pub const TELEGRAM_SINK: &str = "telegram";

/// Severity of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Informational.
    Info,
    /// Something needs attention.
    Warn,
    /// A failure.
    Error,
    /// No particular severity.
    #[default]
    Default,
}

impl NotificationKind {
    /// Hex colour used by card-style sinks.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Info => "#2eb886",
            Self::Warn => "#daa038",
            Self::Error => "#a30200",
            Self::Default => "#dddddd",
        }
    }

    /// Lowercase tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Default => "default",
        }
    }
}

/// A labelled value inside a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationField {
    /// Label, without the `-` marker.
    pub key: String,
    /// Rendered value.
    pub value: String,
    /// Whether the field may share a row with its neighbour.
    pub short: bool,
}

/// A side-channel notice.
///
/// # Example
///
/// ```
/// use trellis_core::{Notification, NotificationKind};
///
/// let notice = Notification::new("import finished")
///     .kind(NotificationKind::Info)
///     .field("Total", "10")
///     .field("-Details", "all rows committed");
///
/// assert!(notice.fields[0].short);
/// assert!(!notice.fields[1].short);
/// assert_eq!(notice.fields[1].key, "Details");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Headline.
    pub title: String,
    /// Severity.
    pub kind: NotificationKind,
    /// Ordered fields.
    pub fields: Vec<NotificationField>,
    /// Trace id to stamp on the notice; minted per notice when absent.
    pub trace_id: Option<TraceId>,
    /// Destination overrides keyed by sink type (alternate webhook, chat id).
    pub destinations: BTreeMap<String, String>,
}

impl Notification {
    /// Creates a notice with the default kind and no fields.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind: NotificationKind::Default,
            fields: Vec::new(),
            trace_id: None,
            destinations: BTreeMap::new(),
        }
    }

    /// Sets the severity.
    #[must_use]
    pub fn kind(mut self, kind: NotificationKind) -> Self {
        self.kind = kind;
        self
    }

    /// Appends a field; a leading `-` on `key` marks it full-width.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let (key, short) = match key.strip_prefix('-') {
            Some(stripped) => (stripped.to_string(), false),
            None => (key, true),
        };
        self.fields.push(NotificationField {
            key,
            value: value.into(),
            short,
        });
        self
    }

    /// Inserts a field at the front, used for caller-supplied unique keys.
    #[must_use]
    pub fn prepend_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let appended = Self::new(String::new()).field(key, value);
        self.fields.splice(0..0, appended.fields);
        self
    }

    /// Sets the trace id.
    #[must_use]
    pub fn trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Overrides the destination for sinks of type `sink`.
    #[must_use]
    pub fn destination(mut self, sink: impl Into<String>, destination: impl Into<String>) -> Self {
        self.destinations.insert(sink.into(), destination.into());
        self
    }

    /// Destination override for sinks of type `sink`.
    #[must_use]
    pub fn destination_for(&self, sink: &str) -> Option<&str> {
        self.destinations.get(sink).map(String::as_str)
    }

    /// Looks up a field value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }

    /// Plain-text rendering used by text-only sinks and log lines.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = self.title.clone();
        for field in &self.fields {
            out.push('\n');
            out.push_str(&field.key);
            out.push_str(": ");
            out.push_str(&field.value);
        }
        out
    }
}

/// Dispatches notifications to side channels.
///
/// Implementations must tolerate being called from detached tasks after the
/// originating response was written; failures are logged, never returned.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `notification` to every active destination.
    async fn notify(&self, ctx: &RequestContext, notification: Notification);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_field() {
        let n = Notification::new("t").field("A", "1").prepend_field("-Key", "k-1");
        assert_eq!(n.fields[0].key, "Key");
        assert!(!n.fields[0].short);
        assert_eq!(n.fields[1].key, "A");
    }

    #[test]
    fn test_destinations_are_per_sink() {
        let n = Notification::new("t")
            .destination(SLACK_SINK, "https://hooks.example/info")
            .destination(TELEGRAM_SINK, "-100");
        assert_eq!(n.destination_for(SLACK_SINK), Some("https://hooks.example/info"));
        assert_eq!(n.destination_for(TELEGRAM_SINK), Some("-100"));
        assert_eq!(n.destination_for("memory"), None);
    }

    #[test]
    fn test_render_text() {
        let n = Notification::new("Panic").field("Method", "GET").field("-Path", "/v1/x");
        assert_eq!(n.render_text(), "Panic\nMethod: GET\nPath: /v1/x");
        assert_eq!(n.get("Path"), Some("/v1/x"));
        assert_eq!(n.get("Missing"), None);
    }

    #[test]
    fn test_kind_serialization() {
        assert_eq!(serde_json::to_string(&NotificationKind::Warn).unwrap(), "\"warn\"");
        assert_eq!(NotificationKind::Error.as_str(), "error");
        assert_eq!(NotificationKind::default(), NotificationKind::Default);
    }
}
