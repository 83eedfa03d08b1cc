//! # Trellis Importer
//!
//! Concurrent import of spreadsheet-shaped uploads.
//!
//! An [`ImportJob`] reads a csv, xls, or xlsx upload on the blocking pool,
//! maps each data row onto a row type by header name, and fans the rows out
//! to a pool of workers. Each worker validates its row, opens a transaction
//! from the [`TransactionFactory`], runs the [`RowProcessor`], and commits or
//! rolls back. Outcomes are folded into an [`ImportSummary`] and, depending
//! on the [`NotifyPreference`], announced through the context's notifier.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_importer::{ImportJob, NoTransaction};
//!
//! let summary = ImportJob::new()
//!     .file(upload)
//!     .process_name("users")
//!     .run::<UserRow, _, _>(&ctx, Arc::new(NoTransaction), Arc::new(UserProcessor))
//!     .await?;
//! println!("{} of {} rows failed", summary.total_failed, summary.total_data);
//! ```

#![doc(html_root_url = "https://docs.rs/trellis-importer/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod job;
mod kind;
mod reader;
mod summary;
mod transaction;
mod worker;

pub use error::{ImportError, ImportResult};
pub use job::{ImportJob, DEFAULT_WORKERS};
pub use kind::FileKind;
pub use reader::RawRow;
pub use summary::{ImportSummary, NotifyPreference, PREVIEW_LIMIT};
pub use transaction::{NoTransaction, RowProcessor, Transaction, TransactionFactory};
pub use worker::RowOutcome;

/// Error codes for row outcomes.
pub mod codes {
    /// A row could not be mapped onto the row type.
    pub const ERROR_PARSING_ROW: &str = "ERROR_PARSING_ROW";
    /// The upload cannot be imported at all.
    pub const ERROR_IMPORT_FILE: &str = "ERROR_IMPORT_FILE";
    /// A row transaction could not be opened or committed.
    pub const TRANSACTION_FAILED: &str = "TRANSACTION_FAILED";
}
