//! Notification errors.

use thiserror::Error;

/// Why a sink failed to deliver.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The HTTP request could not be sent.
    #[error("{sink} request failed: {source}")]
    Transport {
        /// Sink type tag.
        sink: &'static str,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The remote endpoint rejected the payload.
    #[error("{sink} responded with status {status}: {body}")]
    Rejected {
        /// Sink type tag.
        sink: &'static str,
        /// HTTP status returned.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The sink lacks a required setting for this delivery.
    #[error("{sink} is misconfigured: {message}")]
    Misconfigured {
        /// Sink type tag.
        sink: &'static str,
        /// What is missing.
        message: String,
    },
}

impl NotifyError {
    /// Sink type tag of the failing sink.
    #[must_use]
    pub fn sink(&self) -> &'static str {
        match self {
            Self::Transport { sink, .. }
            | Self::Rejected { sink, .. }
            | Self::Misconfigured { sink, .. } => sink,
        }
    }
}
