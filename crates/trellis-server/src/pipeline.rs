//! The per-request execution pipeline.
//!
//! For each matched request the pipeline builds the request view, mints a
//! trace id, derives a deadline context, and runs the handler on its own
//! task. The awaiting side selects between the deadline and the handler's
//! single-shot result channel; whichever fires first decides the one
//! response. A handler that outlives its deadline keeps running until it
//! observes cancellation, and its result is dropped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use http::StatusCode;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::Instrument;
use trellis_core::{
    codes, HandlerResult, HttpError, Notification, NotificationKind, RequestContext, ServiceInfo,
    TraceId,
};
use trellis_extract::{MultipartConfig, PathParams, Request};
use trellis_telemetry::metrics::{record_request, record_timeout};

use crate::panic::{CaughtPanic, PanicReporter, RequestMeta};
use crate::{BoxedHandler, HttpRequest, Response, ResponseWriter};

/// Default per-request deadline.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(3);

/// Body of the 504 response.
pub const TIMEOUT_BODY: &str = "timeout";

/// How a request left the executing state.
///
/// Stored in the response extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The handler returned before the deadline.
    Completed,
    /// The deadline fired first.
    TimedOut,
    /// The handler panicked before the deadline.
    Panicked,
}

impl Completion {
    /// Stable label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Panicked => "panicked",
        }
    }
}

enum Outcome {
    Returned(HandlerResult),
    Panicked,
}

/// Runs handlers under a deadline with panic containment.
#[derive(Debug, Clone)]
pub struct Pipeline {
    api_timeout: Duration,
    reporter: PanicReporter,
    service: ServiceInfo,
    multipart: MultipartConfig,
}

impl Pipeline {
    /// Creates a pipeline with the given per-request deadline.
    pub fn new(api_timeout: Duration, service: ServiceInfo) -> Self {
        Self {
            api_timeout,
            reporter: PanicReporter::new(service.clone()),
            service,
            multipart: MultipartConfig::default(),
        }
    }

    /// Replaces the panic reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: PanicReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Overrides multipart limits for request views.
    #[must_use]
    pub fn with_multipart_config(mut self, config: MultipartConfig) -> Self {
        self.multipart = config;
        self
    }

    /// The per-request deadline.
    pub fn api_timeout(&self) -> Duration {
        self.api_timeout
    }

    /// Executes `handler` for `request`, producing exactly one response.
    ///
    /// Path parameters are read from the request extensions.
    pub async fn execute(
        &self,
        ctx: &mut RequestContext,
        request: HttpRequest,
        handler: &BoxedHandler,
    ) -> Response {
        let started = Instant::now();
        let params = request.extensions().get::<PathParams>().cloned().unwrap_or_default();
        let request =
            Request::from_http(request, params).with_multipart_config(self.multipart.clone());
        let meta = RequestMeta::capture(&request, self.reporter.key_header());

        let trace_id = TraceId::new();
        ctx.set_trace_id(trace_id.clone());
        ctx.span().record("trace_id", trace_id.as_str());

        let deadline = started + self.api_timeout;
        let deadline_ctx = ctx
            .clone()
            .with_parent(ctx.cancellation_token())
            .with_deadline(deadline);

        let (tx, rx) = oneshot::channel();
        let task = {
            let handler = Arc::clone(handler);
            let reporter = self.reporter.clone();
            let task_ctx = deadline_ctx.clone();
            let meta = meta.clone();
            async move {
                let report_ctx = task_ctx.clone();
                let run = AssertUnwindSafe(async move { handler(request, task_ctx).await });
                let outcome = match run.catch_unwind().await {
                    Ok(result) => Outcome::Returned(result),
                    Err(payload) => {
                        let caught = CaughtPanic::from_payload(payload.as_ref());
                        reporter.report(&report_ctx, &meta, &caught);
                        Outcome::Panicked
                    }
                };
                // Fails only when the deadline already won.
                let _ = tx.send(outcome);
            }
        };
        tokio::spawn(task.instrument(ctx.span().clone()));

        let mut writer = ResponseWriter::new();
        let completion = tokio::select! {
            () = tokio::time::sleep_until(deadline) => {
                deadline_ctx.cancel();
                self.on_timeout(&trace_id, &meta, &mut writer)
            }
            outcome = rx => {
                let outcome = outcome.unwrap_or(Outcome::Panicked);
                self.on_outcome(ctx, &meta, outcome, &mut writer)
            }
        };

        let mut response = writer.finish();
        response.extensions_mut().insert(completion);
        record_request(response.status().as_u16(), started.elapsed());
        tracing::debug!(
            trace_id = %trace_id,
            status = response.status().as_u16(),
            completion = completion.as_str(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request finished"
        );
        response
    }

    fn on_timeout(
        &self,
        trace_id: &TraceId,
        meta: &RequestMeta,
        writer: &mut ResponseWriter,
    ) -> Completion {
        record_timeout();
        tracing::warn!(
            trace_id = %trace_id,
            http.method = %meta.method,
            http.path = %meta.path,
            timeout_ms = u64::try_from(self.api_timeout.as_millis()).unwrap_or(u64::MAX),
            "request deadline exceeded"
        );
        if let Err(err) = writer.write_text(StatusCode::GATEWAY_TIMEOUT, TIMEOUT_BODY) {
            tracing::error!(trace_id = %trace_id, error = %err, "timeout response not written");
        }
        Completion::TimedOut
    }

    fn on_outcome(
        &self,
        ctx: &RequestContext,
        meta: &RequestMeta,
        outcome: Outcome,
        writer: &mut ResponseWriter,
    ) -> Completion {
        let trace_id = ctx.trace_id();
        let (completion, written) = match outcome {
            Outcome::Returned(Ok(response)) => {
                (Completion::Completed, writer.write_success(&response))
            }
            Outcome::Returned(Err(err)) => {
                let envelope = err.into_envelope().with_trace_id(trace_id);
                tracing::error!(
                    trace_id = %trace_id,
                    code = %envelope.code,
                    status = envelope.status,
                    http.method = %meta.method,
                    http.path = %meta.path,
                    "{}",
                    envelope.message
                );
                ctx.notify(self.failure_notification(meta, &envelope));
                (Completion::Completed, writer.write_error(&envelope))
            }
            Outcome::Panicked => {
                let envelope = HttpError::internal("internal server error", codes::SERVER_ERROR)
                    .with_trace_id(trace_id);
                (Completion::Panicked, writer.write_error(&envelope))
            }
        };
        if let Err(err) = written {
            tracing::error!(trace_id = %trace_id, error = %err, "response not written");
        }
        completion
    }

    /// Builds the notice sent for a failed response.
    pub fn failure_notification(&self, meta: &RequestMeta, envelope: &HttpError) -> Notification {
        let kind = if envelope.is_server_error() {
            NotificationKind::Error
        } else {
            NotificationKind::Warn
        };
        let mut notification = Notification::new(format!("{} request failed", self.service.label()))
            .kind(kind)
            .field("Method", meta.method.clone())
            .field("Path", meta.path.clone())
            .field("Status", envelope.status.to_string())
            .field("Code", envelope.code.clone())
            .field("-Message", envelope.message.clone());
        if let Some(data) = &envelope.data {
            notification = notification.field("-Data", data.to_string());
        }
        if let Some(key) = &meta.unique_key {
            notification = notification.prepend_field("Unique Key", key.clone());
        }
        notification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IntoHandler;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use trellis_core::{ApiError, ApiResponse, Notifier};
    use trellis_notify::{Fanout, MemorySink};

    fn pipeline(timeout_ms: u64) -> Pipeline {
        Pipeline::new(Duration::from_millis(timeout_ms), ServiceInfo::default())
    }

    fn context(sink: &Arc<MemorySink>) -> RequestContext {
        let notifier: Arc<dyn Notifier> = Arc::new(Fanout::new().with_sink(sink.clone()));
        RequestContext::new().with_notifier(notifier)
    }

    fn request() -> HttpRequest {
        http::Request::builder().uri("/v1/thing").body(Bytes::new()).unwrap()
    }

    async fn body(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn wait_for_deliveries(sink: &MemorySink, count: usize) {
        for _ in 0..100 {
            if sink.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_success() {
        let sink = Arc::new(MemorySink::new());
        let handler = (|_req: Request, _ctx: RequestContext| async {
            Ok::<_, ApiError>(ApiResponse::ok("ok").with_data(json!({"x": 1})))
        })
        .into_handler();

        let mut ctx = context(&sink);
        let response = pipeline(1000).execute(&mut ctx, request(), &handler).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.extensions().get::<Completion>(), Some(&Completion::Completed));
        let value: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(value, json!({"message": "ok", "data": {"x": 1}, "error": null}));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_bare_error_becomes_server_error_with_trace_id() {
        let sink = Arc::new(MemorySink::new());
        let handler = (|_req: Request, _ctx: RequestContext| async {
            Err::<ApiResponse, _>(ApiError::from(anyhow::anyhow!("database unreachable")))
        })
        .into_handler();

        let mut ctx = context(&sink);
        let response = pipeline(1000).execute(&mut ctx, request(), &handler).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let value: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(value["message"], "database unreachable");
        assert_eq!(value["code"], "SERVER_ERROR");
        assert_eq!(value["trace_id"], ctx.trace_id().as_str());

        wait_for_deliveries(&sink, 1).await;
        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(&deliveries[0].trace_id, ctx.trace_id());
        assert_eq!(deliveries[0].notification.kind, NotificationKind::Error);
        assert_eq!(deliveries[0].notification.get("Code"), Some("SERVER_ERROR"));
    }

    #[tokio::test]
    async fn test_timeout_discards_late_result() {
        let sink = Arc::new(MemorySink::new());
        let handler = (|_req: Request, _ctx: RequestContext| async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Err::<ApiResponse, _>(ApiError::from(HttpError::bad_request("too late", "LATE")))
        })
        .into_handler();

        let mut ctx = context(&sink);
        let started = std::time::Instant::now();
        let response = pipeline(30).execute(&mut ctx, request(), &handler).await;

        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.extensions().get::<Completion>(), Some(&Completion::TimedOut));
        assert_eq!(&body(response).await[..], b"timeout");

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_handler_observes_cancellation() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        let handler = (move |_req: Request, ctx: RequestContext| {
            let flag = Arc::clone(&flag);
            async move {
                ctx.done().await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, ApiError>(ApiResponse::ok("unreachable"))
            }
        })
        .into_handler();

        let mut ctx = RequestContext::new();
        let response = pipeline(20).execute(&mut ctx, request(), &handler).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(observed.load(Ordering::SeqCst));
        assert!(!ctx.is_done());
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_reported() {
        let sink = Arc::new(MemorySink::new());
        let handler = (|_req: Request, _ctx: RequestContext| async {
            if true {
                panic!("boom");
            }
            Ok::<_, ApiError>(ApiResponse::ok("never"))
        })
        .into_handler();

        let mut ctx = context(&sink);
        let response = pipeline(1000).execute(&mut ctx, request(), &handler).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.extensions().get::<Completion>(), Some(&Completion::Panicked));
        let value: Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(value["code"], "SERVER_ERROR");
        assert_eq!(value["trace_id"], ctx.trace_id().as_str());

        wait_for_deliveries(&sink, 1).await;
        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].notification.get("Error"), Some("boom"));
        assert_eq!(deliveries[0].notification.get("URI"), Some("/v1/thing"));
    }

    #[test]
    fn test_failure_notification_kind_follows_status() {
        let p = pipeline(10);
        let meta = RequestMeta {
            method: "POST".to_string(),
            path: "/v1/users".to_string(),
            ..RequestMeta::default()
        };
        let client = p.failure_notification(&meta, &HttpError::bad_request("bad age", "BAD_AGE"));
        assert_eq!(client.kind, NotificationKind::Warn);
        assert_eq!(client.get("Status"), Some("400"));

        let server = p.failure_notification(
            &meta,
            &HttpError::new("boom").with_data(json!({"detail": 1})),
        );
        assert_eq!(server.kind, NotificationKind::Error);
        assert_eq!(server.get("Data"), Some(r#"{"detail":1}"#));
    }
}
