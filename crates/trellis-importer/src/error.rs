//! Error types for import jobs.

use thiserror::Error;
use trellis_core::{ApiError, HttpError};

use crate::codes;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Failures that stop an import before or while reading rows.
///
/// Per-row failures never surface here; they are aggregated into the
/// [`ImportSummary`](crate::ImportSummary).
#[derive(Debug, Error)]
pub enum ImportError {
    /// No upload was attached to the job.
    #[error("no file to import")]
    MissingFile,

    /// The upload is not a csv, xls, or xlsx file.
    #[error("unsupported file kind: {0}")]
    UnsupportedKind(String),

    /// The worker count was zero.
    #[error("worker count must be at least 1")]
    NoWorkers,

    /// The file has no header row.
    #[error("file has no header row")]
    MissingHeader,

    /// The requested sheet does not exist in the workbook.
    #[error("sheet not found: {0}")]
    SheetNotFound(String),

    /// The CSV stream could not be read.
    #[error("failed to read csv: {0}")]
    Csv(#[from] csv::Error),

    /// The workbook could not be opened or read.
    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    /// The reader task stopped unexpectedly.
    #[error("row reader stopped: {0}")]
    Reader(String),
}

impl ImportError {
    /// Wraps a calamine failure.
    pub fn spreadsheet(err: impl std::fmt::Display) -> Self {
        Self::Spreadsheet(err.to_string())
    }

    /// Returns `true` when the upload itself is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Reader(_))
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        if err.is_client_error() {
            Self::Envelope(HttpError::bad_request(err.to_string(), codes::ERROR_IMPORT_FILE))
        } else {
            Self::bare(err)
        }
    }
}
