//! Panic capture and reporting.
//!
//! The pipeline runs every handler under `catch_unwind`. A process-wide
//! panic hook, installed once, stores the backtrace of the panicking thread
//! so the reporter can attach it after the unwind has been caught.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::panic;
use std::sync::Once;

use http::HeaderName;
use trellis_core::{Notification, NotificationKind, RequestContext, ServiceInfo};
use trellis_extract::Request;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the backtrace-capturing panic hook. Idempotent.
///
/// The previously installed hook still runs after the capture.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> Option<String> {
    LAST_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// A caught panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaughtPanic {
    /// The panic payload rendered as text.
    pub message: String,
    /// Backtrace captured at the panic site.
    pub backtrace: String,
}

impl CaughtPanic {
    /// Builds from a `catch_unwind` payload.
    ///
    /// Must run on the thread that caught the unwind to pick up its backtrace.
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            message,
            backtrace: take_backtrace().unwrap_or_else(|| "backtrace unavailable".to_string()),
        }
    }
}

/// Request metadata captured before the handler runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// Peer address.
    pub remote_addr: Option<SocketAddr>,
    /// HTTP method.
    pub method: String,
    /// Full request URI.
    pub uri: String,
    /// `Host` header or URI authority.
    pub host: String,
    /// Path component.
    pub path: String,
    /// Caller-supplied key identifying the request's subject.
    pub unique_key: Option<String>,
}

impl RequestMeta {
    /// Captures metadata from the request view.
    pub fn capture(request: &Request, key_header: Option<&HeaderName>) -> Self {
        Self {
            remote_addr: request.remote_addr(),
            method: request.method().to_string(),
            uri: request.uri().to_string(),
            host: request.host().unwrap_or_default().to_string(),
            path: request.path().to_string(),
            unique_key: key_header
                .and_then(|name| request.header(name.as_str()))
                .map(str::to_string),
        }
    }
}

/// Turns caught panics into log lines and error notifications.
#[derive(Debug, Clone)]
pub struct PanicReporter {
    service: ServiceInfo,
    key_header: Option<HeaderName>,
}

impl PanicReporter {
    /// Creates a reporter for the given service and installs the panic hook.
    pub fn new(service: ServiceInfo) -> Self {
        install_panic_hook();
        Self {
            service,
            key_header: None,
        }
    }

    /// Reads the unique key field from this request header.
    #[must_use]
    pub fn with_key_header(mut self, header: HeaderName) -> Self {
        self.key_header = Some(header);
        self
    }

    /// Header the unique key is read from.
    pub fn key_header(&self) -> Option<&HeaderName> {
        self.key_header.as_ref()
    }

    /// Builds the error notification for a panic.
    pub fn notification(&self, meta: &RequestMeta, caught: &CaughtPanic) -> Notification {
        let remote = meta.remote_addr.map(|a| a.to_string()).unwrap_or_default();
        let title = format!("{} panic recovered", self.service.label());
        let mut notification = Notification::new(title)
            .kind(NotificationKind::Error)
            .field("Remote Address", remote)
            .field("Method", meta.method.clone())
            .field("Host", meta.host.clone())
            .field("Path", meta.path.clone())
            .field("App Version", self.service.version.clone())
            .field("-URI", meta.uri.clone())
            .field("-Error", caught.message.clone())
            .field("-Stack Trace", caught.backtrace.clone());
        if let Some(key) = &meta.unique_key {
            notification = notification.prepend_field("Unique Key", key.clone());
        }
        notification
    }

    /// Logs the panic and fans the notification out on a detached context.
    ///
    /// Never panics itself.
    pub fn report(&self, ctx: &RequestContext, meta: &RequestMeta, caught: &CaughtPanic) {
        trellis_telemetry::metrics::record_panic();
        tracing::error!(
            trace_id = %ctx.trace_id(),
            http.method = %meta.method,
            http.path = %meta.path,
            panic = %caught.message,
            backtrace = %caught.backtrace,
            "handler panicked"
        );
        let notification = self.notification(meta, caught).trace_id(ctx.trace_id().clone());
        ctx.notify(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use trellis_extract::{PathParams, RemoteAddr};

    fn service() -> ServiceInfo {
        ServiceInfo {
            app_name: "billing".to_string(),
            env: "staging".to_string(),
            container: "billing-1".to_string(),
            version: "1.2.3".to_string(),
        }
    }

    fn request() -> Request {
        let mut http = http::Request::builder()
            .method("POST")
            .uri("/v1/pay?x=1")
            .header("host", "api.example.com")
            .header("x-user-id", "u-9")
            .body(Bytes::new())
            .unwrap();
        http.extensions_mut().insert(RemoteAddr("10.0.0.7:5555".parse().unwrap()));
        Request::from_http(http, PathParams::new())
    }

    #[test]
    fn test_caught_panic_captures_message_and_backtrace() {
        install_panic_hook();
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        let caught = CaughtPanic::from_payload(payload.as_ref());
        assert_eq!(caught.message, "boom");
        assert!(!caught.backtrace.is_empty());
        assert_ne!(caught.backtrace, "backtrace unavailable");
    }

    #[test]
    fn test_formatted_payload() {
        install_panic_hook();
        let payload = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(CaughtPanic::from_payload(payload.as_ref()).message, "code 7");
    }

    #[test]
    fn test_meta_capture() {
        let key = HeaderName::from_static("x-user-id");
        let meta = RequestMeta::capture(&request(), Some(&key));
        assert_eq!(meta.method, "POST");
        assert_eq!(meta.uri, "/v1/pay?x=1");
        assert_eq!(meta.host, "api.example.com");
        assert_eq!(meta.path, "/v1/pay");
        assert_eq!(meta.remote_addr, Some("10.0.0.7:5555".parse().unwrap()));
        assert_eq!(meta.unique_key.as_deref(), Some("u-9"));
    }

    #[test]
    fn test_notification_fields() {
        let reporter =
            PanicReporter::new(service()).with_key_header(HeaderName::from_static("x-user-id"));
        let meta = RequestMeta::capture(&request(), reporter.key_header());
        let caught = CaughtPanic {
            message: "boom".to_string(),
            backtrace: "frame 0".to_string(),
        };

        let n = reporter.notification(&meta, &caught);
        assert_eq!(n.kind, NotificationKind::Error);
        assert_eq!(n.title, "[staging] billing panic recovered");
        assert_eq!(n.fields[0].key, "Unique Key");
        assert_eq!(n.get("Method"), Some("POST"));
        assert_eq!(n.get("App Version"), Some("1.2.3"));
        assert_eq!(n.get("URI"), Some("/v1/pay?x=1"));
        assert_eq!(n.get("Error"), Some("boom"));
        assert_eq!(n.get("Stack Trace"), Some("frame 0"));
    }
}
