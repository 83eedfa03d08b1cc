//! Request context types.
//!
//! The [`RequestContext`] carries per-request state through middleware and
//! into handlers: identifiers, the deadline, a cancellation token, the
//! caller's claims, and the notifier/cache handles. [`RequestContext::to_async`]
//! derives the detached context used by work that must outlive the request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::{Cache, Notification, Notifier, RequestId, TraceId};

/// Claims attached by application auth middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Value);

impl Claims {
    /// Wraps a claims document.
    #[must_use]
    pub fn new(claims: Value) -> Self {
        Self(claims)
    }

    /// Returns a single claim.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The `sub` claim, if it is a string.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// The full claims document.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Per-request context.
///
/// Cloning is cheap; clones share the cancellation token, so cancelling one
/// clone cancels them all.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use trellis_core::RequestContext;
///
/// # tokio_test::block_on(async {
/// let ctx = RequestContext::new().with_timeout(Duration::from_secs(3));
/// assert!(ctx.deadline().is_some());
///
/// let detached = ctx.to_async();
/// assert!(detached.deadline().is_none());
/// assert_eq!(detached.trace_id(), ctx.trace_id());
/// # });
/// ```
#[derive(Clone)]
pub struct RequestContext {
    request_id: Option<RequestId>,
    trace_id: TraceId,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
    claims: Option<Claims>,
    notifier: Option<Arc<dyn Notifier>>,
    cache: Option<Arc<dyn Cache>>,
    span: Span,
    received_at: Instant,
}

impl RequestContext {
    /// Creates a context with a fresh trace id and no deadline.
    ///
    /// Standalone jobs (scheduled tasks, scripts) use this as their root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: None,
            trace_id: TraceId::new(),
            deadline: None,
            cancellation: CancellationToken::new(),
            claims: None,
            notifier: None,
            cache: None,
            span: Span::none(),
            received_at: Instant::now(),
        }
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the request id in place.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = Some(request_id);
    }

    /// Sets the trace id.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Sets the trace id in place.
    pub fn set_trace_id(&mut self, trace_id: TraceId) {
        self.trace_id = trace_id;
    }

    /// Bounds the context by `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Bounds the context by an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Links cancellation to `parent`: cancelling the parent cancels this context.
    #[must_use]
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancellation = parent.child_token();
        self
    }

    /// Attaches caller claims.
    #[must_use]
    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.claims = Some(claims);
        self
    }

    /// Attaches caller claims in place.
    pub fn set_claims(&mut self, claims: Claims) {
        self.claims = Some(claims);
    }

    /// Attaches the notifier handle.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attaches the cache handle.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attaches the logging span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Request id, when the request-id stage ran.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Trace id.
    #[must_use]
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Absolute deadline, if bounded.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Caller claims.
    #[must_use]
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// Notifier handle.
    #[must_use]
    pub fn notifier(&self) -> Option<&Arc<dyn Notifier>> {
        self.notifier.as_ref()
    }

    /// Cache handle.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// Logging span.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// The cancellation token shared by clones of this context.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Signals cancellation to everything observing this context.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns `true` once cancelled or past the deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancellation.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or its deadline passes.
    ///
    /// Handlers race long operations against this to observe cancellation.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.cancellation.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancellation.cancelled().await,
        }
    }

    /// Derives a detached context for work that must outlive the request.
    ///
    /// Keeps the trace id, claims, notifier, cache, and span. Drops the
    /// deadline, the request id, and the link to the request's cancellation.
    #[must_use]
    pub fn to_async(&self) -> Self {
        Self {
            request_id: None,
            trace_id: self.trace_id.clone(),
            deadline: None,
            cancellation: CancellationToken::new(),
            claims: self.claims.clone(),
            notifier: self.notifier.clone(),
            cache: self.cache.clone(),
            span: self.span.clone(),
            received_at: Instant::now(),
        }
    }

    /// Fires `notification` through the attached notifier on a detached task.
    ///
    /// Returns `None` when no notifier is attached.
    pub fn notify(&self, notification: Notification) -> Option<JoinHandle<()>> {
        let notifier = self.notifier.clone()?;
        let detached = self.to_async();
        Some(tokio::spawn(async move {
            notifier.notify(&detached, notification).await;
        }))
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("trace_id", &self.trace_id)
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("claims", &self.claims)
            .field("has_notifier", &self.notifier.is_some())
            .field("has_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
