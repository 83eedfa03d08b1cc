//! Slack incoming-webhook sink.

use async_trait::async_trait;
use serde_json::{json, Value};
use trellis_core::{Notification, SLACK_SINK};

use crate::{Delivery, NotifyError, Sink};

const SINK: &str = SLACK_SINK;

/// Posts notifications to a Slack incoming webhook as an attachment card.
///
/// A delivery destination replaces the configured webhook URL for that call.
#[derive(Debug, Clone)]
pub struct SlackSink {
    webhook_url: String,
    active: bool,
    client: reqwest::Client,
}

impl SlackSink {
    /// Creates a sink; active when `webhook_url` is non-empty.
    #[must_use]
    pub fn new(webhook_url: impl Into<String>) -> Self {
        let webhook_url = webhook_url.into();
        Self {
            active: !webhook_url.trim().is_empty(),
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Overrides the activation flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Shares an existing HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Builds the webhook payload.
    #[must_use]
    pub fn payload(delivery: Delivery<'_>, notification: &Notification) -> Value {
        let fields: Vec<Value> = notification
            .fields
            .iter()
            .map(|f| json!({"title": f.key, "value": f.value, "short": f.short}))
            .collect();

        json!({
            "attachments": [{
                "color": notification.kind.color(),
                "title": notification.title,
                "fields": fields,
                "footer": format!("trace_id: {}", delivery.trace_id),
                "ts": chrono::Utc::now().timestamp(),
            }]
        })
    }
}

#[async_trait]
impl Sink for SlackSink {
    fn sink_type(&self) -> &'static str {
        SINK
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn send(
        &self,
        delivery: Delivery<'_>,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let url = delivery.destination.unwrap_or(&self.webhook_url);
        if url.is_empty() {
            return Err(NotifyError::Misconfigured {
                sink: SINK,
                message: "webhook url is empty".into(),
            });
        }

        let response = self
            .client
            .post(url)
            .json(&Self::payload(delivery, notification))
            .send()
            .await
            .map_err(|source| NotifyError::Transport { sink: SINK, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                sink: SINK,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
