//! The sink contract.

use async_trait::async_trait;
use trellis_core::{Notification, TraceId};

use crate::NotifyError;

/// Per-call delivery parameters.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// Trace id stamped on the rendered message.
    pub trace_id: &'a TraceId,
    /// Sink-specific destination override (alternate webhook URL, chat id).
    pub destination: Option<&'a str>,
}

impl<'a> Delivery<'a> {
    /// Delivery to the sink's default destination.
    #[must_use]
    pub const fn new(trace_id: &'a TraceId) -> Self {
        Self {
            trace_id,
            destination: None,
        }
    }

    /// Overrides the destination.
    #[must_use]
    pub const fn to(mut self, destination: Option<&'a str>) -> Self {
        self.destination = destination;
        self
    }
}

/// A notification destination.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable type tag, e.g. `slack`.
    fn sink_type(&self) -> &'static str;

    /// Whether the fanout should deliver to this sink.
    fn is_active(&self) -> bool;

    /// Renders `notification` into the sink's native payload and sends it.
    async fn send(
        &self,
        delivery: Delivery<'_>,
        notification: &Notification,
    ) -> Result<(), NotifyError>;
}
