//! Shutdown coordination.
//!
//! [`ShutdownSignal`] is a cloneable trigger shared by the accept loop and
//! every connection task. Triggering is sticky: waiters that subscribe after
//! the fact resolve immediately.

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Future returned by [`ShutdownSignal::recv`].
pub type ShutdownReceiver = WaitForCancellationFutureOwned;

/// A cloneable shutdown trigger.
///
/// # Example
///
/// ```rust
/// use trellis_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let other = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(other.is_shutdown());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers shutdown. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns `true` once triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the signal is triggered.
    pub fn recv(&self) -> ShutdownReceiver {
        self.token.clone().cancelled_owned()
    }

    /// A signal triggered by SIGINT, SIGTERM, or SIGHUP (Ctrl+C elsewhere).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            wait_for_os_signal().await;
            trigger.trigger();
        });
        signal
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let kinds = [
        ("SIGINT", SignalKind::interrupt()),
        ("SIGTERM", SignalKind::terminate()),
        ("SIGHUP", SignalKind::hangup()),
    ];
    let mut streams = Vec::with_capacity(kinds.len());
    for (name, kind) in kinds {
        match signal(kind) {
            Ok(stream) => streams.push((name, stream)),
            Err(err) => {
                tracing::warn!(signal = name, error = %err, "failed to register signal handler");
            }
        }
    }
    if streams.is_empty() {
        wait_for_ctrl_c().await;
        return;
    }

    let waits = streams.iter_mut().map(|(name, stream)| {
        Box::pin(async move {
            stream.recv().await;
            *name
        })
    });
    let (name, _, _) = futures_util::future::select_all(waits).await;
    tracing::info!(signal = name, "received signal, initiating graceful shutdown");
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        Err(err) => {
            tracing::error!(
                error = %err,
                "cannot listen for Ctrl+C; shutdown must be triggered explicitly"
            );
            std::future::pending::<()>().await;
        }
    }
}
