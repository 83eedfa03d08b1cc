//! Telegram bot sink.

use async_trait::async_trait;
use serde_json::{json, Value};
use trellis_core::{Notification, TELEGRAM_SINK};

use crate::{Delivery, NotifyError, Sink};

const SINK: &str = TELEGRAM_SINK;
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Sends notifications through the Telegram bot API as HTML messages.
///
/// A delivery destination replaces the configured chat id for that call.
#[derive(Debug, Clone)]
pub struct TelegramSink {
    token: String,
    chat_id: Option<String>,
    api_base: String,
    active: bool,
    client: reqwest::Client,
}

impl TelegramSink {
    /// Creates a sink; active when `token` is non-empty.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            active: !token.trim().is_empty(),
            token,
            chat_id: None,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Sets the default chat id.
    #[must_use]
    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Points the sink at a different API host.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
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

    /// Renders the HTML message body.
    #[must_use]
    pub fn render(delivery: Delivery<'_>, notification: &Notification) -> String {
        let mut text = format!("<b>{}</b>\n", escape(&notification.title));
        for field in &notification.fields {
            if field.short {
                text.push_str(&format!(
                    "<b>{}</b>: {}\n",
                    escape(&field.key),
                    escape(&field.value)
                ));
            } else {
                text.push_str(&format!(
                    "<b>{}</b>:\n<pre>{}</pre>\n",
                    escape(&field.key),
                    escape(&field.value)
                ));
            }
        }
        text.push_str(&format!("<code>trace_id: {}</code>", escape(delivery.trace_id.as_str())));
        text
    }

    fn payload(chat_id: &str, delivery: Delivery<'_>, notification: &Notification) -> Value {
        json!({
            "chat_id": chat_id,
            "text": Self::render(delivery, notification),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        })
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl Sink for TelegramSink {
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
        let chat_id = delivery
            .destination
            .or(self.chat_id.as_deref())
            .ok_or_else(|| NotifyError::Misconfigured {
                sink: SINK,
                message: "no chat id configured".into(),
            })?;

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let response = self
            .client
            .post(url)
            .json(&Self::payload(chat_id, delivery, notification))
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
