//! Whole-job behaviour: reading, workers, aggregation, and the summary notice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use trellis_core::{
    ApiError, Claims, HttpError, Notifier, RequestContext, ServiceInfo, SLACK_SINK, TELEGRAM_SINK,
};
use trellis_extract::UploadedFile;
use trellis_importer::{
    ImportError, ImportJob, NoTransaction, NotifyPreference, RowProcessor, Transaction,
    TransactionFactory, PREVIEW_LIMIT,
};
use trellis_macros::Validate;
use trellis_notify::{Fanout, MemorySink};

#[derive(Debug, Serialize, Deserialize, Validate)]
struct Person {
    #[validate(required)]
    name: String,
    age: String,
}

#[derive(Debug, Default)]
struct Ledger {
    begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

struct LedgerTx(Arc<Ledger>);

#[async_trait]
impl Transaction for LedgerTx {
    async fn commit(self) -> anyhow::Result<()> {
        self.0.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> anyhow::Result<()> {
        self.0.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct LedgerFactory(Arc<Ledger>);

#[async_trait]
impl TransactionFactory for LedgerFactory {
    type Transaction = LedgerTx;

    async fn begin(&self) -> anyhow::Result<LedgerTx> {
        self.0.begun.fetch_add(1, Ordering::SeqCst);
        Ok(LedgerTx(Arc::clone(&self.0)))
    }
}

/// Rejects rows whose age is not a number.
struct NumericAge {
    seen_workers: parking_lot::Mutex<Vec<usize>>,
}

impl NumericAge {
    fn new() -> Self {
        Self {
            seen_workers: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl<Tx: Send + 'static> RowProcessor<Person, Tx> for NumericAge {
    async fn process(
        &self,
        _ctx: &RequestContext,
        row: &Person,
        _tx: &mut Tx,
        worker: usize,
    ) -> Result<(), ApiError> {
        self.seen_workers.lock().push(worker);
        tokio::time::sleep(Duration::from_millis(5)).await;
        if row.age.parse::<u32>().is_err() {
            return Err(HttpError::bad_request("age not numeric", "BAD_AGE").into());
        }
        Ok(())
    }
}

fn csv(data: &str) -> UploadedFile {
    UploadedFile {
        field_name: "file".into(),
        file_name: Some("people.csv".into()),
        content_type: Some("text/csv".into()),
        data: Bytes::from(data.to_string()),
    }
}

fn context(sink: &Arc<MemorySink>) -> RequestContext {
    let notifier: Arc<dyn Notifier> = Arc::new(Fanout::new().with_sink(sink.clone()));
    RequestContext::new().with_notifier(notifier)
}

#[tokio::test]
async fn summary_groups_rejected_rows() {
    let sink = Arc::new(MemorySink::new());
    let ledger = Arc::new(Ledger::default());

    let summary = ImportJob::new()
        .file(csv("name,age\nA,10\nB,NaN"))
        .workers(2)
        .process_name("people")
        .run::<Person, _, _>(
            &context(&sink),
            Arc::new(LedgerFactory(Arc::clone(&ledger))),
            Arc::new(NumericAge::new()),
        )
        .await
        .unwrap();

    assert_eq!(summary.total_data, 2);
    assert_eq!(summary.total_failed, 1);
    assert_eq!(
        serde_json::to_value(&summary.failed_list).unwrap(),
        json!({"age not numeric": [{"name": "B", "age": "NaN"}]})
    );
    assert_eq!(ledger.begun.load(Ordering::SeqCst), 2);
    assert_eq!(ledger.commits.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.rollbacks.load(Ordering::SeqCst), 1);

    let deliveries = sink.deliveries();
    assert_eq!(deliveries.len(), 1);
    let notice = &deliveries[0].notification;
    assert_eq!(notice.get("Total Data"), Some("2"));
    assert_eq!(notice.get("Total Failed"), Some("1"));
    assert!(notice.get("Failed: age not numeric").is_some());
}

#[tokio::test]
async fn header_only_file_notifies_once() {
    let sink = Arc::new(MemorySink::new());

    let summary = ImportJob::new()
        .file(csv("name,age\n"))
        .run::<Person, _, _>(&context(&sink), Arc::new(NoTransaction), Arc::new(NumericAge::new()))
        .await
        .unwrap();

    assert_eq!(summary.total_data, 0);
    assert_eq!(summary.total_failed, 0);
    assert!(summary.failed_list.is_empty());
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.deliveries()[0].notification.title, "import upload completed");
}

#[tokio::test]
async fn invalid_rows_skip_the_processor() {
    let sink = Arc::new(MemorySink::new());
    let ledger = Arc::new(Ledger::default());
    let processor = Arc::new(NumericAge::new());

    let summary = ImportJob::new()
        .file(csv("name,age\n,10\nC,7\n"))
        .run::<Person, _, _>(
            &context(&sink),
            Arc::new(LedgerFactory(Arc::clone(&ledger))),
            Arc::clone(&processor),
        )
        .await
        .unwrap();

    assert_eq!(summary.total_failed, 1);
    let samples = &summary.failed_list["validation error"];
    assert_eq!(samples[0]["validation_error"][0]["field"], "Person.name");
    assert_eq!(samples[0]["row"], json!({"name": "", "age": "10"}));
    assert_eq!(ledger.begun.load(Ordering::SeqCst), 1);
    assert_eq!(processor.seen_workers.lock().len(), 1);
}

#[tokio::test]
async fn rows_spread_across_workers() {
    let sink = Arc::new(MemorySink::new());
    let processor = Arc::new(NumericAge::new());
    let mut data = String::from("name,age\n");
    for i in 0..40 {
        data.push_str(&format!("p{i},{i}\n"));
    }

    let summary = ImportJob::new()
        .file(csv(&data))
        .workers(4)
        .run::<Person, _, _>(&context(&sink), Arc::new(NoTransaction), Arc::clone(&processor))
        .await
        .unwrap();

    assert_eq!(summary.total_data, 40);
    assert!(summary.is_clean());
    let seen = processor.seen_workers.lock();
    assert_eq!(seen.len(), 40);
    assert!(seen.iter().all(|w| *w < 4));
    assert!(seen.iter().any(|w| *w != seen[0]));
}

#[tokio::test]
async fn notice_carries_destination_claims_and_identity() {
    let sink = Arc::new(MemorySink::new());
    let ctx = context(&sink).with_claims(Claims::new(json!({"sub": "admin"})));
    let service = ServiceInfo {
        app_name: "crm".into(),
        env: "prod".into(),
        ..ServiceInfo::default()
    };

    ImportJob::new()
        .file(csv("name,age\nA,x\n"))
        .process_name("people")
        .service_info(service)
        .destination(SLACK_SINK, "https://hooks.example/info")
        .run::<Person, _, _>(&ctx, Arc::new(NoTransaction), Arc::new(NumericAge::new()))
        .await
        .unwrap();

    let delivery = &sink.deliveries()[0];
    assert_eq!(
        delivery.notification.destination_for(SLACK_SINK),
        Some("https://hooks.example/info")
    );
    assert_eq!(delivery.notification.destination_for(TELEGRAM_SINK), None);
    assert_eq!(delivery.destination, None);
    assert_eq!(delivery.trace_id, *ctx.trace_id());
    assert_eq!(delivery.notification.title, "[prod] crm import people finished with 1 failed rows");
    assert_eq!(delivery.notification.get("Requested By"), Some(r#"{"sub":"admin"}"#));
}

#[tokio::test]
async fn notify_preference_is_honoured() {
    let sink = Arc::new(MemorySink::new());
    let ctx = context(&sink);

    ImportJob::new()
        .file(csv("name,age\nA,1\n"))
        .notify(NotifyPreference::OnFailure)
        .run::<Person, _, _>(&ctx, Arc::new(NoTransaction), Arc::new(NumericAge::new()))
        .await
        .unwrap();
    assert!(sink.is_empty());

    ImportJob::new()
        .file(csv("name,age\nA,x\n"))
        .notify(NotifyPreference::Never)
        .run::<Person, _, _>(&ctx, Arc::new(NoTransaction), Arc::new(NumericAge::new()))
        .await
        .unwrap();
    assert!(sink.is_empty());
}

#[tokio::test]
async fn spawned_import_outlives_request_deadline() {
    let sink = Arc::new(MemorySink::new());
    let ctx = context(&sink).with_timeout(Duration::from_millis(1));
    let mut data = String::from("name,age\n");
    for i in 0..20 {
        data.push_str(&format!("p{i},{i}\n"));
    }

    let handle = ImportJob::new()
        .file(csv(&data))
        .workers(1)
        .spawn::<Person, _, _>(&ctx, Arc::new(NoTransaction), Arc::new(NumericAge::new()));
    ctx.cancel();

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.total_data, 20);
    assert!(summary.execution_time >= Duration::from_millis(20 * 5));
}

#[tokio::test]
async fn input_errors_fail_fast() {
    let sink = Arc::new(MemorySink::new());
    let ctx = context(&sink);

    let missing = ImportJob::new()
        .run::<Person, _, _>(&ctx, Arc::new(NoTransaction), Arc::new(NumericAge::new()))
        .await;
    assert!(matches!(missing, Err(ImportError::MissingFile)));

    let mut pdf = csv("");
    pdf.file_name = Some("people.pdf".into());
    pdf.content_type = None;
    let unsupported = ImportJob::new()
        .file(pdf)
        .run::<Person, _, _>(&ctx, Arc::new(NoTransaction), Arc::new(NumericAge::new()))
        .await;
    assert!(matches!(unsupported, Err(ImportError::UnsupportedKind(_))));

    let empty = ImportJob::new()
        .file(csv(""))
        .run::<Person, _, _>(&ctx, Arc::new(NoTransaction), Arc::new(NumericAge::new()))
        .await;
    assert!(matches!(empty, Err(ImportError::MissingHeader)));
    assert!(sink.is_empty());
}

struct RejectAll;

#[async_trait]
impl RowProcessor<Person, NoTransaction> for RejectAll {
    async fn process(
        &self,
        _ctx: &RequestContext,
        row: &Person,
        _tx: &mut NoTransaction,
        _worker: usize,
    ) -> Result<(), ApiError> {
        if row.age == "bad" {
            return Err(HttpError::bad_request("bad", "BAD").into());
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn aggregation_counts_every_row(n in 0usize..40, m_seed in 0usize..40, workers in 1usize..6) {
        let m = if n == 0 { 0 } else { m_seed % (n + 1) };
        let mut data = String::from("name,age\n");
        for i in 0..n {
            let age = if i < m { "bad".to_string() } else { i.to_string() };
            data.push_str(&format!("p{i},{age}\n"));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let summary = runtime.block_on(
            ImportJob::new()
                .file(csv(&data))
                .workers(workers)
                .notify(NotifyPreference::Never)
                .run::<Person, _, _>(
                    &RequestContext::new(),
                    Arc::new(NoTransaction),
                    Arc::new(RejectAll),
                ),
        ).unwrap();

        prop_assert_eq!(summary.total_data, n);
        prop_assert_eq!(summary.total_failed, m);
        let previewed = summary.failed_list.get("bad").map_or(0, Vec::len);
        prop_assert_eq!(previewed, m.min(PREVIEW_LIMIT));
    }
}
