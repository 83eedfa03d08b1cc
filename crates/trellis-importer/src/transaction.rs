//! Seams between the importer and the caller's storage.
//!
//! Every row gets its own transaction from the [`TransactionFactory`]. The
//! worker commits when the [`RowProcessor`] succeeds and rolls back when it
//! fails.
//!
//! A single processor instance is shared by all workers and is invoked
//! concurrently, so implementations must be safe to call from several tasks
//! at once. Guard shared mutable state inside the processor.

use async_trait::async_trait;
use trellis_core::{ApiError, RequestContext};

/// A unit of work that is either committed or rolled back.
#[async_trait]
pub trait Transaction: Send + 'static {
    /// Makes the row's writes durable.
    async fn commit(self) -> anyhow::Result<()>;

    /// Discards the row's writes.
    async fn rollback(self) -> anyhow::Result<()>;
}

/// Opens transactions for import workers.
#[async_trait]
pub trait TransactionFactory: Send + Sync + 'static {
    /// The transaction type handed to the processor.
    type Transaction: Transaction;

    /// Begins a fresh transaction.
    async fn begin(&self) -> anyhow::Result<Self::Transaction>;
}

/// Applies one decoded, validated row.
#[async_trait]
pub trait RowProcessor<T, Tx>: Send + Sync + 'static
where
    T: Send + Sync,
    Tx: Send,
{
    /// Processes `row` inside `tx`. `worker` is the index of the calling
    /// worker, in `0..workers`.
    ///
    /// An `Err` rolls the transaction back and is reported under its
    /// envelope message.
    async fn process(
        &self,
        ctx: &RequestContext,
        row: &T,
        tx: &mut Tx,
        worker: usize,
    ) -> Result<(), ApiError>;
}

/// A transaction factory for processors that do not touch a database.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransaction;

#[async_trait]
impl Transaction for NoTransaction {
    async fn commit(self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn rollback(self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TransactionFactory for NoTransaction {
    type Transaction = Self;

    async fn begin(&self) -> anyhow::Result<Self> {
        Ok(Self)
    }
}
