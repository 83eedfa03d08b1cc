//! Import job configuration and execution.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn, Instrument};
use trellis_config::AppConfig;
use trellis_core::{RequestContext, ServiceInfo, Validate, SLACK_SINK};
use trellis_extract::UploadedFile;

use crate::reader::spawn_reader;
use crate::summary::{summary_notification, Aggregator};
use crate::worker::{SharedRows, Worker};
use crate::{
    FileKind, ImportError, ImportResult, ImportSummary, NotifyPreference, RowProcessor,
    TransactionFactory,
};

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 10;

/// One upload to import.
///
/// # Example
///
/// ```rust,ignore
/// let file = request.file("file").await?;
/// let summary = ImportJob::new()
///     .file(file)
///     .workers(4)
///     .process_name("users")
///     .run::<UserRow, _, _>(&ctx, Arc::new(pool), Arc::new(UserImporter))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ImportJob {
    file: Option<UploadedFile>,
    kind: Option<FileKind>,
    sheet: Option<String>,
    workers: usize,
    process_name: String,
    notify: NotifyPreference,
    destinations: BTreeMap<String, String>,
    service: ServiceInfo,
}

impl Default for ImportJob {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportJob {
    /// Creates a job with ten workers that always notifies.
    pub fn new() -> Self {
        Self {
            file: None,
            kind: None,
            sheet: None,
            workers: DEFAULT_WORKERS,
            process_name: "upload".to_string(),
            notify: NotifyPreference::Always,
            destinations: BTreeMap::new(),
            service: ServiceInfo::default(),
        }
    }

    /// Takes the worker count, service identity, and the Slack info webhook as
    /// the summary destination from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut job = Self::new()
            .workers(config.import.workers)
            .service_info(config.service_info());
        if let Some(webhook) = &config.notifications.slack_info_webhook {
            job = job.destination(SLACK_SINK, webhook.clone());
        }
        job
    }

    /// Sets the upload.
    pub fn file(mut self, file: UploadedFile) -> Self {
        self.file = Some(file);
        self
    }

    /// Forces the file kind instead of detecting it.
    pub fn kind(mut self, kind: FileKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Reads the named sheet instead of the first one.
    pub fn sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// Sets the worker count.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Names the import in logs and the summary notice.
    pub fn process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = name.into();
        self
    }

    /// Sets when the summary notice is sent.
    pub fn notify(mut self, preference: NotifyPreference) -> Self {
        self.notify = preference;
        self
    }

    /// Routes the summary notice to another destination on sinks of type `sink`.
    pub fn destination(mut self, sink: impl Into<String>, destination: impl Into<String>) -> Self {
        self.destinations.insert(sink.into(), destination.into());
        self
    }

    /// Sets the service identity used in the notice title.
    pub fn service_info(mut self, service: ServiceInfo) -> Self {
        self.service = service;
        self
    }

    fn prepare(&mut self) -> ImportResult<(UploadedFile, FileKind)> {
        let file = self.file.take().ok_or(ImportError::MissingFile)?;
        let kind = match self.kind {
            Some(kind) => kind,
            None => FileKind::detect(&file)?,
        };
        if self.workers == 0 {
            return Err(ImportError::NoWorkers);
        }
        Ok((file, kind))
    }

    /// Runs the import to completion.
    ///
    /// Workers run on a context detached from `ctx`, so the request deadline
    /// does not cut the import short. Input problems fail before any row is
    /// read. Row failures are aggregated into the summary.
    pub async fn run<T, F, P>(
        mut self,
        ctx: &RequestContext,
        factory: Arc<F>,
        processor: Arc<P>,
    ) -> ImportResult<ImportSummary>
    where
        T: DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
        F: TransactionFactory,
        P: RowProcessor<T, F::Transaction>,
    {
        let started = Instant::now();
        let (file, kind) = self.prepare()?;
        let ctx = ctx.to_async();
        let capacity = self.workers * 2;

        info!(
            process = %self.process_name,
            kind = %kind,
            workers = self.workers,
            bytes = file.size(),
            "import started"
        );

        let (row_tx, row_rx) = mpsc::channel(capacity);
        let reader = spawn_reader(file.data, kind, self.sheet.take(), row_tx);
        let rows: SharedRows = Arc::new(Mutex::new(row_rx));

        let (outcome_tx, mut outcome_rx) = mpsc::channel(capacity);
        let mut pool = JoinSet::new();
        for index in 0..self.workers {
            let worker = Worker {
                index,
                ctx: ctx.clone(),
                factory: Arc::clone(&factory),
                processor: Arc::clone(&processor),
            };
            pool.spawn(
                worker
                    .run::<T>(Arc::clone(&rows), outcome_tx.clone())
                    .instrument(ctx.span().clone()),
            );
        }
        // The outcome channel closes once the last worker drops its sender.
        drop(outcome_tx);

        let mut aggregator = Aggregator::default();
        while let Some(outcome) = outcome_rx.recv().await {
            aggregator.record(outcome);
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                warn!(
                    process = %self.process_name,
                    error = %err,
                    "import worker stopped abnormally"
                );
            }
        }
        reader.await.map_err(|err| ImportError::Reader(err.to_string()))??;

        let summary = aggregator.finish(started.elapsed());
        info!(
            process = %self.process_name,
            total = summary.total_data,
            failed = summary.total_failed,
            secs = summary.execution_time.as_secs_f64(),
            "import finished"
        );

        if self.notify.wants(&summary) {
            if let Some(notifier) = ctx.notifier() {
                let mut notification = summary_notification(
                    &self.service.label(),
                    &self.process_name,
                    &summary,
                    ctx.claims(),
                );
                for (sink, destination) in &self.destinations {
                    notification = notification.destination(sink.clone(), destination.clone());
                }
                notifier.notify(&ctx, notification).await;
            }
        }
        Ok(summary)
    }

    /// Runs the import on its own task and returns immediately.
    pub fn spawn<T, F, P>(
        self,
        ctx: &RequestContext,
        factory: Arc<F>,
        processor: Arc<P>,
    ) -> JoinHandle<ImportResult<ImportSummary>>
    where
        T: DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
        F: TransactionFactory,
        P: RowProcessor<T, F::Transaction>,
    {
        let ctx = ctx.to_async();
        tokio::spawn(async move { self.run::<T, F, P>(&ctx, factory, processor).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn upload(name: &str) -> UploadedFile {
        UploadedFile {
            field_name: "file".into(),
            file_name: Some(name.into()),
            content_type: None,
            data: Bytes::from_static(b"a\n1\n"),
        }
    }

    #[test]
    fn test_prepare_requires_file() {
        assert!(matches!(ImportJob::new().prepare(), Err(ImportError::MissingFile)));
    }

    #[test]
    fn test_prepare_rejects_unknown_kind() {
        let mut job = ImportJob::new().file(upload("data.json"));
        assert!(matches!(job.prepare(), Err(ImportError::UnsupportedKind(_))));
    }

    #[test]
    fn test_prepare_forced_kind() {
        let mut job = ImportJob::new().file(upload("data.txt")).kind(FileKind::Csv);
        assert_eq!(job.prepare().unwrap().1, FileKind::Csv);
    }

    #[test]
    fn test_prepare_rejects_zero_workers() {
        let mut job = ImportJob::new().file(upload("data.csv")).workers(0);
        assert!(matches!(job.prepare(), Err(ImportError::NoWorkers)));
    }

    #[test]
    fn test_from_config() {
        let mut config = AppConfig::default();
        config.import.workers = 3;
        config.notifications.slack_info_webhook = Some("https://hooks.example/info".into());
        let job = ImportJob::from_config(&config);
        assert_eq!(job.workers, 3);
        assert_eq!(
            job.destinations.get(SLACK_SINK).map(String::as_str),
            Some("https://hooks.example/info")
        );
        assert!(!job.destinations.contains_key(trellis_core::TELEGRAM_SINK));
    }
}
