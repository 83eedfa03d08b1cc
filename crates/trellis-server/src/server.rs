//! HTTP listener and lifecycle.
//!
//! [`Server::bind`] opens the listener (IPv4 `0.0.0.0` by default) and loads
//! TLS material when configured. [`BoundServer::serve`] accepts connections
//! until the shutdown signal fires, then cancels in-flight request contexts,
//! asks every connection to finish gracefully, and waits up to the drain
//! window before giving up with [`ServerError::ShutdownTimedOut`].

use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;
use tokio_util::task::TaskTracker;
use trellis_core::{codes, HttpError, Notification, NotificationKind};
use trellis_extract::RemoteAddr;

use crate::config::TlsConfig;
use crate::shutdown::ShutdownSignal;
use crate::writer::error_response;
use crate::{App, Response, ServerConfig, ServerError};

/// An application paired with its listener configuration.
///
/// # Example
///
/// ```rust,ignore
/// use trellis_config::ConfigLoader;
/// use trellis_server::{App, Server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ConfigLoader::new().with_dotenv()?.load()?;
///     let app = App::builder().build();
///     Server::new(app, ServerConfig::from(&config)).run().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    app: App,
    config: ServerConfig,
}

impl Server {
    /// Pairs `app` with `config`.
    pub fn new(app: App, config: ServerConfig) -> Self {
        Self { app, config }
    }

    /// Opens the listener.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let tls = self.config.tls().map(load_tls).transpose()?;
        let local_addr = listener.local_addr()?;

        tracing::info!(addr = %local_addr, tls = tls.is_some(), "server listening");

        Ok(BoundServer {
            listener,
            local_addr,
            tls,
            app: self.app,
            config: self.config,
        })
    }

    /// Binds and serves until SIGINT, SIGTERM, or SIGHUP.
    pub async fn run(self) -> Result<(), ServerError> {
        let bound = self.bind().await?;
        bound.serve(ShutdownSignal::with_os_signals()).await
    }
}

/// A server with an open listener.
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    app: App,
    config: ServerConfig,
}

impl std::fmt::Debug for BoundServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundServer")
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls.is_some())
            .field("app", &self.app)
            .finish_non_exhaustive()
    }
}

impl BoundServer {
    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `shutdown` fires, then drains.
    pub async fn serve(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let Self {
            listener,
            tls,
            app,
            config,
            ..
        } = self;
        let config = Arc::new(config);
        let connections = TaskTracker::new();

        if config.notify_service_status() {
            announce(&app, "started").await;
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to accept connection");
                            continue;
                        }
                    };
                    let app = app.clone();
                    let config = Arc::clone(&config);
                    let shutdown = shutdown.clone();
                    let tls = tls.clone();
                    connections.spawn(async move {
                        let served = accept(stream, remote_addr, tls, app, &config, shutdown).await;
                        if let Err(err) = served {
                            tracing::debug!(
                                remote = %remote_addr,
                                error = %err,
                                "connection closed with error"
                            );
                        }
                    });
                }
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, stopping listener");
                    break;
                }
            }
        }
        drop(listener);
        connections.close();
        app.cancel_all();

        let drain = config.shutdown_timeout();
        tracing::info!(
            active = connections.len(),
            drain_secs = drain.as_secs(),
            "waiting for connections to drain"
        );
        let drained = tokio::time::timeout(drain, connections.wait()).await.is_ok();

        if config.notify_service_status() {
            announce(&app, "stopped").await;
        }

        if drained {
            tracing::info!("server stopped");
            Ok(())
        } else {
            tracing::error!(active = connections.len(), "shutdown timed out");
            Err(ServerError::ShutdownTimedOut)
        }
    }
}

async fn accept(
    stream: TcpStream,
    remote_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    app: App,
    config: &ServerConfig,
    shutdown: ShutdownSignal,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match tls {
        Some(acceptor) => {
            let stream = acceptor.accept(stream).await?;
            serve_connection(stream, remote_addr, app, config, shutdown).await
        }
        None => serve_connection(stream, remote_addr, app, config, shutdown).await,
    }
}

async fn serve_connection<I>(
    io: I,
    remote_addr: SocketAddr,
    app: App,
    config: &ServerConfig,
    shutdown: ShutdownSignal,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let write_timeout = config.write_timeout();
    let read_timeout = config.read_timeout();
    let max_body_bytes = config.max_body_bytes();
    let service = service_fn(move |request: http::Request<Incoming>| {
        let app = app.clone();
        async move {
            let (mut parts, body) = request.into_parts();
            let body = match read_body(body, max_body_bytes, read_timeout).await {
                Ok(body) => body,
                Err(envelope) => {
                    tracing::warn!(
                        remote = %remote_addr,
                        http.method = %parts.method,
                        http.path = %parts.uri.path(),
                        status = envelope.status,
                        error = %envelope.message,
                        "rejected request body"
                    );
                    return Ok::<Response, io::Error>(error_response(&envelope));
                }
            };
            parts.extensions.insert(RemoteAddr(remote_addr));
            let request = http::Request::from_parts(parts, body);

            tokio::time::timeout(write_timeout, app.handle(request))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timeout exceeded"))
        }
    });

    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(config.read_timeout())
        .max_buf_size(config.codec_buf_size())
        .serve_connection(TokioIo::new(io), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => result?,
        () = shutdown.recv() => {
            connection.as_mut().graceful_shutdown();
            connection.await?;
        }
    }
    Ok(())
}

/// Buffers a request body, bounded in size by `limit` and in time by `timeout`.
async fn read_body<B>(body: B, limit: usize, timeout: Duration) -> Result<Bytes, HttpError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let collected = tokio::time::timeout(timeout, Limited::new(body, limit).collect())
        .await
        .map_err(|_| {
            HttpError::with_status(
                StatusCode::REQUEST_TIMEOUT,
                "timed out reading request body",
                codes::ERROR_PARSING_BODY,
            )
        })?;

    match collected {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => Err(HttpError::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {limit} bytes"),
            codes::ERROR_PAYLOAD_TOO_LARGE,
        )),
        Err(err) => Err(HttpError::bad_request(
            format!("failed to read request body: {err}"),
            codes::ERROR_PARSING_BODY,
        )),
    }
}

async fn announce(app: &App, state: &str) {
    let Some(notifier) = app.notifier() else {
        return;
    };
    let service = app.service_info();
    let notification = Notification::new(format!("{} {state}", service.label()))
        .kind(NotificationKind::Info)
        .field("Container", service.container.clone())
        .field("Version", service.version.clone());
    let ctx = app.root_context().to_async();
    notifier.notify(&ctx, notification).await;
}

fn load_tls(config: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let cert_file = File::open(&config.cert_file)
        .map_err(|e| ServerError::tls(&config.cert_file, e.to_string()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::tls(&config.cert_file, e.to_string()))?;
    if certs.is_empty() {
        return Err(ServerError::tls(&config.cert_file, "no certificates found"));
    }

    let key_file = File::open(&config.key_file)
        .map_err(|e| ServerError::tls(&config.key_file, e.to_string()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| ServerError::tls(&config.key_file, e.to_string()))?
        .ok_or_else(|| ServerError::tls(&config.key_file, "no private key found"))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let server_config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::tls(&config.cert_file, e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::tls(&config.cert_file, e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
