//! Server error types.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while bringing the server up or down.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// Address that failed.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Certificate or key material could not be loaded.
    #[error("invalid TLS material in {path}: {message}")]
    Tls {
        /// Offending file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// In-flight connections did not drain within the shutdown window.
    #[error("shutdown timed out")]
    ShutdownTimedOut,

    /// I/O failure while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub(crate) fn tls(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Tls {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Returned when a response is written twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The writer already holds a response.
    #[error("response already written")]
    AlreadyWritten,
}
