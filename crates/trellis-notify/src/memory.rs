//! In-memory recording sink.

use async_trait::async_trait;
use parking_lot::Mutex;
use trellis_core::{Notification, TraceId};

use crate::{Delivery, NotifyError, Sink};

/// One delivery captured by [`MemorySink`].
#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    /// Trace id the delivery carried.
    pub trace_id: TraceId,
    /// Destination override, if any.
    pub destination: Option<String>,
    /// The notification as sent.
    pub notification: Notification,
}

/// Records every delivery instead of sending it anywhere.
#[derive(Debug)]
pub struct MemorySink {
    active: bool,
    deliveries: Mutex<Vec<RecordedDelivery>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    /// Creates an active, empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active: true,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// Overrides the activation flag.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Snapshot of the recorded deliveries.
    #[must_use]
    pub fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries.lock().clone()
    }

    /// Number of recorded deliveries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Returns `true` when nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }

    /// Drops all recorded deliveries.
    pub fn clear(&self) {
        self.deliveries.lock().clear();
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn sink_type(&self) -> &'static str {
        "memory"
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn send(
        &self,
        delivery: Delivery<'_>,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        self.deliveries.lock().push(RecordedDelivery {
            trace_id: delivery.trace_id.clone(),
            destination: delivery.destination.map(str::to_string),
            notification: notification.clone(),
        });
        Ok(())
    }
}
