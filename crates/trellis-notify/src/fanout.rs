//! Dispatch of one notification to every active sink.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use trellis_config::NotificationSettings;
use trellis_core::{Notification, Notifier, RequestContext, TraceId};

use crate::{Delivery, NotifyError, Sink, SlackSink, TelegramSink};

/// An ordered set of sinks.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use trellis_core::Notification;
/// use trellis_notify::{Fanout, MemorySink};
///
/// # tokio_test::block_on(async {
/// let memory = Arc::new(MemorySink::new());
/// let fanout = Fanout::new().with_sink(memory.clone());
///
/// fanout.dispatch(Notification::new("deploy finished")).await;
/// assert_eq!(memory.len(), 1);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn Sink>>,
}

impl Fanout {
    /// Creates a fanout with no sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the Slack and Telegram sinks from configuration.
    ///
    /// A sink is active when its credential is set.
    #[must_use]
    pub fn from_settings(settings: &NotificationSettings) -> Self {
        let client = reqwest::Client::new();

        let slack = SlackSink::new(settings.slack_webhook_url.clone().unwrap_or_default())
            .with_client(client.clone());

        let mut telegram = TelegramSink::new(settings.telegram_token.clone().unwrap_or_default())
            .with_client(client);
        if let Some(chat_id) = &settings.telegram_chat_id {
            telegram = telegram.with_chat_id(chat_id.clone());
        }

        Self::new()
            .with_sink(Arc::new(slack))
            .with_sink(Arc::new(telegram))
    }

    /// Appends a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Appends a sink in place.
    pub fn push(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }

    /// All sinks in registration order.
    #[must_use]
    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }

    /// Number of active sinks.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sinks.iter().filter(|s| s.is_active()).count()
    }

    /// Sends to every active sink, minting a trace id when the notification has none.
    pub async fn dispatch(&self, notification: Notification) -> Vec<Result<(), NotifyError>> {
        let trace_id = notification.trace_id.clone().unwrap_or_default();
        self.deliver(&trace_id, &notification).await
    }

    async fn deliver(
        &self,
        trace_id: &TraceId,
        notification: &Notification,
    ) -> Vec<Result<(), NotifyError>> {
        let sends = self
            .sinks
            .iter()
            .filter(|sink| sink.is_active())
            .map(|sink| async move {
                let delivery =
                    Delivery::new(trace_id).to(notification.destination_for(sink.sink_type()));
                let result = sink.send(delivery, notification).await;
                if let Err(err) = &result {
                    tracing::warn!(
                        sink = sink.sink_type(),
                        trace_id = %trace_id,
                        error = %err,
                        "notification delivery failed"
                    );
                }
                result
            });
        join_all(sends).await
    }
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types: Vec<&str> = self.sinks.iter().map(|s| s.sink_type()).collect();
        f.debug_struct("Fanout").field("sinks", &types).finish()
    }
}

#[async_trait]
impl Notifier for Fanout {
    async fn notify(&self, ctx: &RequestContext, notification: Notification) {
        let trace_id = notification
            .trace_id
            .clone()
            .unwrap_or_else(|| ctx.trace_id().clone());
        self.deliver(&trace_id, &notification).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;

    struct Failing;

    #[async_trait]
    impl Sink for Failing {
        fn sink_type(&self) -> &'static str {
            "failing"
        }

        fn is_active(&self) -> bool {
            true
        }

        async fn send(&self, _: Delivery<'_>, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Misconfigured {
                sink: "failing",
                message: "always".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_short_circuit() {
        let memory = Arc::new(MemorySink::new());
        let fanout = Fanout::new()
            .with_sink(Arc::new(Failing))
            .with_sink(memory.clone());

        let results = fanout.dispatch(Notification::new("x")).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_sinks_are_skipped() {
        let memory = Arc::new(MemorySink::new().with_active(false));
        let fanout = Fanout::new().with_sink(memory.clone());
        assert_eq!(fanout.active_count(), 0);
        fanout.dispatch(Notification::new("x")).await;
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_trace_id_selection() {
        let memory = Arc::new(MemorySink::new());
        let fanout = Fanout::new().with_sink(memory.clone());
        let ctx = RequestContext::new();

        fanout.notify(&ctx, Notification::new("from ctx")).await;
        let explicit = TraceId::from_string("explicit");
        fanout
            .notify(&ctx, Notification::new("explicit").trace_id(explicit.clone()))
            .await;

        let deliveries = memory.deliveries();
        assert_eq!(&deliveries[0].trace_id, ctx.trace_id());
        assert_eq!(deliveries[1].trace_id, explicit);
    }

    #[tokio::test]
    async fn test_standalone_dispatch_mints_trace_ids() {
        let memory = Arc::new(MemorySink::new());
        let fanout = Fanout::new().with_sink(memory.clone());
        fanout.dispatch(Notification::new("a")).await;
        fanout.dispatch(Notification::new("b")).await;
        let deliveries = memory.deliveries();
        assert_ne!(deliveries[0].trace_id, deliveries[1].trace_id);
    }

    #[tokio::test]
    async fn test_destination_follows_sink_type() {
        let memory = Arc::new(MemorySink::new());
        let fanout = Fanout::new().with_sink(memory.clone());
        fanout
            .dispatch(
                Notification::new("x")
                    .destination("slack", "https://hooks.example/info")
                    .destination("memory", "inbox"),
            )
            .await;
        fanout
            .dispatch(Notification::new("y").destination("slack", "https://hooks.example/info"))
            .await;

        let deliveries = memory.deliveries();
        assert_eq!(deliveries[0].destination.as_deref(), Some("inbox"));
        assert_eq!(deliveries[1].destination, None);
    }

    #[test]
    fn test_from_settings_activation() {
        let settings = NotificationSettings {
            slack_webhook_url: Some("https://hooks.example/x".into()),
            ..NotificationSettings::default()
        };
        let fanout = Fanout::from_settings(&settings);
        assert_eq!(fanout.sinks().len(), 2);
        assert_eq!(fanout.active_count(), 1);
        assert_eq!(format!("{fanout:?}"), "Fanout { sinks: [\"slack\", \"telegram\"] }");
    }
}
