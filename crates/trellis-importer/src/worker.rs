//! Import workers.
//!
//! Workers share one row receiver. Each row moves through
//! decode, validate, begin, process, then commit or rollback, and every
//! row yields exactly one [`RowOutcome`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use trellis_core::{codes as core_codes, HttpError, RequestContext, Validate};

use crate::reader::RawRow;
use crate::{codes, RowProcessor, Transaction, TransactionFactory};

/// The result of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    /// Source line of the row.
    pub line: usize,
    /// `None` when the row was committed.
    pub error: Option<HttpError>,
}

impl RowOutcome {
    fn ok(line: usize) -> Self {
        Self { line, error: None }
    }

    fn failed(line: usize, error: HttpError) -> Self {
        Self {
            line,
            error: Some(error),
        }
    }

    /// Returns `true` when the row failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

pub(crate) type SharedRows = Arc<Mutex<mpsc::Receiver<RawRow>>>;

pub(crate) struct Worker<F, P> {
    pub index: usize,
    pub ctx: RequestContext,
    pub factory: Arc<F>,
    pub processor: Arc<P>,
}

impl<F, P> Worker<F, P>
where
    F: TransactionFactory,
{
    /// Drains `rows` until the producer closes it or the collector goes away.
    pub async fn run<T>(self, rows: SharedRows, outcomes: mpsc::Sender<RowOutcome>)
    where
        T: DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
        P: RowProcessor<T, F::Transaction>,
    {
        loop {
            let next = rows.lock().await.recv().await;
            let Some(raw) = next else {
                break;
            };
            let outcome = self.handle::<T>(raw).await;
            let label = if outcome.is_failed() { "failed" } else { "ok" };
            trellis_telemetry::metrics::record_import_row(label);
            if outcomes.send(outcome).await.is_err() {
                break;
            }
        }
        debug!(worker = self.index, "import worker finished");
    }

    async fn handle<T>(&self, raw: RawRow) -> RowOutcome
    where
        T: DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
        P: RowProcessor<T, F::Transaction>,
    {
        let line = raw.line;
        let raw_value = raw.to_value();

        let row: T = match serde_json::from_value(raw_value.clone()) {
            Ok(row) => row,
            Err(err) => {
                let error = HttpError::bad_request("failed to decode row", codes::ERROR_PARSING_ROW)
                    .with_data(json!({"error": err.to_string(), "row": raw_value}));
                return RowOutcome::failed(line, error);
            }
        };
        let row_value = serde_json::to_value(&row).unwrap_or(raw_value);

        if let Err(errors) = row.validate() {
            let error = HttpError::bad_request("validation error", core_codes::VALIDATION_ERROR)
                .with_data(json!({"validation_error": errors.to_value(), "row": row_value}));
            return RowOutcome::failed(line, error);
        }

        let mut tx = match self.factory.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                warn!(worker = self.index, line, error = %err, "failed to begin transaction");
                let error = HttpError::internal(
                    format!("failed to begin transaction: {err}"),
                    codes::TRANSACTION_FAILED,
                )
                .with_data(row_value);
                return RowOutcome::failed(line, error);
            }
        };

        let processing = self.processor.process(&self.ctx, &row, &mut tx, self.index);
        let processed = AssertUnwindSafe(processing).catch_unwind().await;

        let failure = match processed {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.into_envelope()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(worker = self.index, line, panic = %message, "row processor panicked");
                Some(HttpError::new(format!("row processor panicked: {message}")))
            }
        };

        match failure {
            None => match tx.commit().await {
                Ok(()) => RowOutcome::ok(line),
                Err(err) => {
                    warn!(worker = self.index, line, error = %err, "failed to commit transaction");
                    let error = HttpError::internal(
                        format!("failed to commit transaction: {err}"),
                        codes::TRANSACTION_FAILED,
                    )
                    .with_data(row_value);
                    RowOutcome::failed(line, error)
                }
            },
            Some(mut error) => {
                if let Err(err) = tx.rollback().await {
                    warn!(
                        worker = self.index,
                        line,
                        error = %err,
                        "failed to roll back transaction"
                    );
                }
                if error.data.is_none() {
                    error.data = Some(row_value);
                }
                RowOutcome::failed(line, error)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
