//! Application assembly.
//!
//! [`AppBuilder`] collects controllers, global middleware, and the shared
//! handles (notifier, cache), then freezes them into an [`App`]. The app is a
//! plain `http::Request<Bytes> -> Response` function, so it can be driven by
//! the listener or directly from tests.

use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderValue, ALLOW};
use http::{HeaderName, Method, StatusCode};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::field::Empty;
use tracing::Instrument;
use trellis_config::AppConfig;
use trellis_core::{codes, Cache, HttpError, Notifier, RequestContext, ServiceInfo};
use trellis_extract::MultipartConfig;

use crate::middleware::Endpoint;
use crate::panic::PanicReporter;
use crate::pipeline::{Pipeline, DEFAULT_API_TIMEOUT};
use crate::route::{Lookup, RouteTable};
use crate::stages::{RequestIdMiddleware, SecureHeadersMiddleware};
use crate::writer::{error_response, json_response};
use crate::{BoxFuture, BoxedHandler, Controller, HttpRequest, Middleware, Next, Response, Route};

/// Path of the liveness check.
pub const PING_PATH: &str = "/ping";

/// Builder for [`App`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use trellis_core::{ApiResponse, HandlerResult, RequestContext};
/// use trellis_extract::Request;
/// use trellis_server::{App, Controller, Route};
///
/// async fn list(_req: Request, _ctx: RequestContext) -> HandlerResult {
///     Ok(ApiResponse::ok("users"))
/// }
///
/// let app = App::builder()
///     .api_timeout(Duration::from_secs(5))
///     .controller(Controller::new("/users").route(Route::get(list)))
///     .build();
/// assert_eq!(app.route_count(), 1);
/// ```
pub struct AppBuilder {
    controllers: Vec<Controller>,
    middleware: Vec<Arc<dyn Middleware>>,
    api_timeout: Duration,
    secure_headers: bool,
    notifier: Option<Arc<dyn Notifier>>,
    cache: Option<Arc<dyn Cache>>,
    service: ServiceInfo,
    panic_key_header: Option<HeaderName>,
    multipart: MultipartConfig,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    /// Creates a builder with a 3 s deadline and secure headers on.
    pub fn new() -> Self {
        Self {
            controllers: Vec::new(),
            middleware: Vec::new(),
            api_timeout: DEFAULT_API_TIMEOUT,
            secure_headers: true,
            notifier: None,
            cache: None,
            service: ServiceInfo::default(),
            panic_key_header: None,
            multipart: MultipartConfig::default(),
        }
    }

    /// Applies deadline, secure-headers, and service tags from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new()
            .api_timeout(config.server.api_timeout())
            .secure_headers(config.server.secure_headers)
            .service_info(config.service_info())
    }

    /// Registers a controller.
    pub fn controller(mut self, controller: Controller) -> Self {
        self.controllers.push(controller);
        self
    }

    /// Registers a route outside any controller.
    pub fn route(self, route: Route) -> Self {
        self.controller(Controller::new("").route(route))
    }

    /// Appends a global middleware. Global middleware runs after the
    /// built-in request-id and secure-headers stages and before routing.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Sets the per-request deadline.
    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    /// Enables or disables the secure-headers stage.
    pub fn secure_headers(mut self, enabled: bool) -> Self {
        self.secure_headers = enabled;
        self
    }

    /// Attaches the notifier used for failure and panic notices.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Attaches a cache handle to every request context.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the deployment tags used in notices.
    pub fn service_info(mut self, service: ServiceInfo) -> Self {
        self.service = service;
        self
    }

    /// Reads the panic notice's unique key from this header.
    pub fn panic_key_header(mut self, header: HeaderName) -> Self {
        self.panic_key_header = Some(header);
        self
    }

    /// Overrides multipart limits.
    pub fn multipart(mut self, config: MultipartConfig) -> Self {
        self.multipart = config;
        self
    }

    /// Freezes the route table.
    pub fn build(self) -> App {
        let mut reporter = PanicReporter::new(self.service.clone());
        if let Some(header) = self.panic_key_header {
            reporter = reporter.with_key_header(header);
        }
        let pipeline = Arc::new(
            Pipeline::new(self.api_timeout, self.service.clone())
                .with_reporter(reporter)
                .with_multipart_config(self.multipart),
        );

        let mut routes = RouteTable::default();
        for controller in self.controllers {
            for entry in controller.into_entries() {
                tracing::debug!(method = %entry.method, path = %entry.path, "route registered");
                routes.push(entry);
            }
        }

        let mut chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(RequestIdMiddleware::new())];
        if self.secure_headers {
            chain.push(Arc::new(SecureHeadersMiddleware::new()));
        }
        chain.extend(self.middleware);

        App {
            inner: Arc::new(AppInner {
                router: Router { routes, pipeline },
                chain,
                notifier: self.notifier,
                cache: self.cache,
                service: self.service,
                root: CancellationToken::new(),
            }),
        }
    }
}

struct AppInner {
    router: Router,
    chain: Vec<Arc<dyn Middleware>>,
    notifier: Option<Arc<dyn Notifier>>,
    cache: Option<Arc<dyn Cache>>,
    service: ServiceInfo,
    root: CancellationToken,
}

/// A built application. Cheap to clone.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// Starts a builder.
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Handles one buffered request.
    pub async fn handle(&self, request: HttpRequest) -> Response {
        let span = tracing::info_span!(
            "request",
            http.method = %request.method(),
            http.path = %request.uri().path(),
            request_id = Empty,
            trace_id = Empty,
        );
        let mut ctx = RequestContext::new()
            .with_parent(&self.inner.root)
            .with_span(span.clone());
        if let Some(notifier) = &self.inner.notifier {
            ctx = ctx.with_notifier(Arc::clone(notifier));
        }
        if let Some(cache) = &self.inner.cache {
            ctx = ctx.with_cache(Arc::clone(cache));
        }

        Next::new(&self.inner.chain, &self.inner.router)
            .run(&mut ctx, request)
            .instrument(span)
            .await
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        self.inner.router.routes.len()
    }

    /// The per-request deadline.
    pub fn api_timeout(&self) -> Duration {
        self.inner.router.pipeline.api_timeout()
    }

    /// Deployment tags.
    pub fn service_info(&self) -> &ServiceInfo {
        &self.inner.service
    }

    /// The attached notifier.
    pub fn notifier(&self) -> Option<&Arc<dyn Notifier>> {
        self.inner.notifier.as_ref()
    }

    /// A root-level context carrying the app's notifier and cache.
    pub fn root_context(&self) -> RequestContext {
        let mut ctx = RequestContext::new().with_parent(&self.inner.root);
        if let Some(notifier) = &self.inner.notifier {
            ctx = ctx.with_notifier(Arc::clone(notifier));
        }
        if let Some(cache) = &self.inner.cache {
            ctx = ctx.with_cache(Arc::clone(cache));
        }
        ctx
    }

    /// Cancels every request context derived from this app.
    pub fn cancel_all(&self) {
        self.inner.root.cancel();
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.route_count())
            .field("api_timeout", &self.api_timeout())
            .field("service", &self.inner.service)
            .finish_non_exhaustive()
    }
}

/// Terminal endpoint of the global chain: ping, lookup, route chain.
struct Router {
    routes: RouteTable,
    pipeline: Arc<Pipeline>,
}

impl Endpoint for Router {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        mut request: HttpRequest,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if request.method() == Method::GET && request.uri().path() == PING_PATH {
                return json_response(StatusCode::OK, &json!({"message": "pong"}));
            }

            match self.routes.lookup(request.method(), request.uri().path()) {
                Lookup::Found(entry, params) => {
                    request.extensions_mut().insert(params);
                    let endpoint = RouteEndpoint {
                        handler: &entry.handler,
                        pipeline: &self.pipeline,
                    };
                    Next::new(&entry.chain, &endpoint).run(ctx, request).await
                }
                Lookup::MethodNotAllowed(allowed) => {
                    let mut response = error_response(&HttpError::method_not_allowed(
                        "method not allowed",
                        codes::METHOD_NOT_ALLOWED,
                    ));
                    let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                    if let Ok(value) = HeaderValue::from_str(&allow) {
                        response.headers_mut().insert(ALLOW, value);
                    }
                    response
                }
                Lookup::NotFound => error_response(&HttpError::not_found(
                    "route not found",
                    codes::ROUTE_NOT_FOUND,
                )),
            }
        })
    }
}

struct RouteEndpoint<'r> {
    handler: &'r BoxedHandler,
    pipeline: &'r Pipeline,
}

impl Endpoint for RouteEndpoint<'_> {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: HttpRequest,
    ) -> BoxFuture<'a, Response> {
        Box::pin(self.pipeline.execute(ctx, request, self.handler))
    }
}
