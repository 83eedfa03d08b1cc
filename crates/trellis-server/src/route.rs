//! Versioned routes, controllers, and the frozen route table.
//!
//! A route's final path is `/v{version}{controller path}{suffix}`. Path
//! segments written as `{name}` capture a parameter. The middleware chain of
//! a route is its controller's middleware followed by its own.
//!
//! # Example
//!
//! ```
//! use http::Method;
//! use trellis_core::{ApiResponse, HandlerResult, RequestContext};
//! use trellis_extract::Request;
//! use trellis_server::{Controller, Route};
//!
//! async fn show(req: Request, _ctx: RequestContext) -> HandlerResult {
//!     Ok(ApiResponse::ok(req.param("id").to_string()))
//! }
//!
//! let users = Controller::new("/users").route(Route::get(show).path("/{id}").version(2));
//! assert_eq!(users.routes()[0].full_path(users.path()), "/v2/users/{id}");
//! assert_eq!(users.routes()[0].method(), &Method::GET);
//! ```

use std::sync::Arc;

use http::Method;
use trellis_extract::PathParams;

use crate::{BoxedHandler, IntoHandler, Middleware};

/// Default API version.
pub const DEFAULT_VERSION: u32 = 1;

/// A single endpoint registration.
pub struct Route {
    method: Method,
    suffix: String,
    version: u32,
    handler: BoxedHandler,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Route {
    /// Creates a route for `method` served by `handler`.
    pub fn new(method: Method, handler: impl IntoHandler) -> Self {
        Self {
            method,
            suffix: String::new(),
            version: DEFAULT_VERSION,
            handler: handler.into_handler(),
            middleware: Vec::new(),
        }
    }

    /// `GET` route.
    pub fn get(handler: impl IntoHandler) -> Self {
        Self::new(Method::GET, handler)
    }

    /// `POST` route.
    pub fn post(handler: impl IntoHandler) -> Self {
        Self::new(Method::POST, handler)
    }

    /// `PUT` route.
    pub fn put(handler: impl IntoHandler) -> Self {
        Self::new(Method::PUT, handler)
    }

    /// `PATCH` route.
    pub fn patch(handler: impl IntoHandler) -> Self {
        Self::new(Method::PATCH, handler)
    }

    /// `DELETE` route.
    pub fn delete(handler: impl IntoHandler) -> Self {
        Self::new(Method::DELETE, handler)
    }

    /// Sets the path suffix appended after the controller path.
    pub fn path(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Sets the API version.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Appends a middleware to this route's chain.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    pub fn layer(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// API version.
    pub fn api_version(&self) -> u32 {
        self.version
    }

    /// Final path under a controller prefix.
    pub fn full_path(&self, controller: &str) -> String {
        let mut path = format!("/v{}", self.version);
        push_segment(&mut path, controller);
        push_segment(&mut path, &self.suffix);
        path
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("suffix", &self.suffix)
            .field("version", &self.version)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

fn push_segment(path: &mut String, segment: &str) {
    let segment = segment.trim_matches('/');
    if !segment.is_empty() {
        path.push('/');
        path.push_str(segment);
    }
}

/// A group of routes sharing a path prefix and middleware.
#[derive(Default)]
pub struct Controller {
    path: String,
    routes: Vec<Route>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Controller {
    /// Creates a controller mounted at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            routes: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Adds a route.
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Appends a middleware shared by every route of this controller.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    pub fn layer(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Path prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Registered routes.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Flattens the controller into table entries.
    pub(crate) fn into_entries(self) -> impl Iterator<Item = RouteEntry> {
        let Self { path, routes, middleware } = self;
        routes.into_iter().map(move |route| {
            let full_path = route.full_path(&path);
            let mut chain = middleware.clone();
            chain.extend(route.middleware);
            RouteEntry {
                method: route.method,
                pattern: PathPattern::parse(&full_path),
                path: full_path,
                chain,
                handler: route.handler,
            }
        })
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let middleware: Vec<&str> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("Controller")
            .field("path", &self.path)
            .field("routes", &self.routes)
            .field("middleware", &middleware)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub(crate) fn parse(path: &str) -> Self {
        let segments = split(path)
            .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self { segments }
    }

    fn literals(&self) -> usize {
        self.segments.iter().filter(|s| matches!(s, Segment::Literal(_))).count()
    }

    pub(crate) fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::new();
        let mut parts = split(path);
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push(name.clone(), part),
            }
        }
        parts.next().is_none().then_some(params)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// A registered route after flattening.
pub(crate) struct RouteEntry {
    pub(crate) method: Method,
    pub(crate) path: String,
    pattern: PathPattern,
    pub(crate) chain: Vec<Arc<dyn Middleware>>,
    pub(crate) handler: BoxedHandler,
}

/// Result of a route lookup.
pub(crate) enum Lookup<'a> {
    Found(&'a RouteEntry, PathParams),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// Routes frozen at application build time.
///
/// When several patterns match, the one with the most literal segments
/// wins; ties go to the earliest registration.
#[derive(Default)]
pub(crate) struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub(crate) fn push(&mut self, entry: RouteEntry) {
        if self.entries.iter().any(|e| e.method == entry.method && e.path == entry.path) {
            tracing::warn!(
                method = %entry.method,
                path = %entry.path,
                "duplicate route registration"
            );
        }
        self.entries.push(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        let mut best: Option<(&RouteEntry, PathParams)> = None;
        let mut allowed = Vec::new();

        for entry in &self.entries {
            let Some(params) = entry.pattern.matches(path) else {
                continue;
            };
            if entry.method != *method {
                if !allowed.contains(&entry.method) {
                    allowed.push(entry.method.clone());
                }
                continue;
            }
            let better = best
                .as_ref()
                .map_or(true, |(current, _)| entry.pattern.literals() > current.pattern.literals());
            if better {
                best = Some((entry, params));
            }
        }

        match best {
            Some((entry, params)) => Lookup::Found(entry, params),
            None if !allowed.is_empty() => Lookup::MethodNotAllowed(allowed),
            None => Lookup::NotFound,
        }
    }
}
