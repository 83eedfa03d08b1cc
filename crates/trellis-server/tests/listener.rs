//! Serving over a real socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use trellis_core::{ApiResponse, HandlerResult, Notifier, RequestContext, ServiceInfo};
use trellis_extract::Request;
use trellis_notify::{Fanout, MemorySink};
use trellis_server::{App, Route, Server, ServerConfig, ServerError, ShutdownSignal};

async fn whoami(req: Request, _ctx: RequestContext) -> HandlerResult {
    let remote = req.remote_addr().map(|addr| addr.ip().to_string());
    Ok(ApiResponse::ok("hello").with_data(json!({"remote": remote})))
}

async fn start(
    app: App,
    notify_status: bool,
) -> (SocketAddr, ShutdownSignal, JoinHandle<Result<(), ServerError>>) {
    let config = ServerConfig::builder()
        .host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .port(0)
        .shutdown_timeout(Duration::from_secs(2))
        .notify_service_status(notify_status)
        .build();
    let bound = Server::new(app, config).bind().await.unwrap();
    let addr = bound.local_addr();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));
    (addr, shutdown, handle)
}

#[tokio::test]
async fn serves_json_over_tcp() {
    let app = App::builder().route(Route::get(whoami).path("/whoami")).build();
    let (addr, shutdown, handle) = start(app, false).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{addr}/v1/whoami"))
        .header("x-request-id", "caller-supplied")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], "caller-supplied");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "hello");
    assert_eq!(body["data"]["remote"], "127.0.0.1");
    assert_eq!(body["error"], Value::Null);

    let ping = client.get(format!("http://{addr}/ping")).send().await.unwrap();
    assert_eq!(ping.text().await.unwrap(), r#"{"message":"pong"}"#);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn announces_start_and_stop() {
    let sink = Arc::new(MemorySink::new());
    let notifier: Arc<dyn Notifier> = Arc::new(Fanout::new().with_sink(sink.clone()));
    let service = ServiceInfo {
        app_name: "billing".into(),
        env: "staging".into(),
        ..ServiceInfo::default()
    };
    let app = App::builder().notifier(notifier).service_info(service).build();

    let (_addr, shutdown, handle) = start(app, true).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let titles: Vec<String> = sink
        .deliveries()
        .into_iter()
        .map(|d| d.notification.title)
        .collect();
    assert_eq!(titles, vec!["[staging] billing started", "[staging] billing stopped"]);
}

#[tokio::test]
async fn shutdown_cancels_in_flight_requests() {
    let handler = |_req: Request, ctx: RequestContext| async move {
        ctx.done().await;
        let result: HandlerResult = Ok(ApiResponse::ok("cancelled"));
        result
    };
    let app = App::builder()
        .api_timeout(Duration::from_secs(30))
        .route(Route::get(handler).path("/wait"))
        .build();
    let (addr, shutdown, handle) = start(app, false).await;

    let request = tokio::spawn(async move {
        reqwest::get(format!("http://{addr}/v1/wait")).await.unwrap().json::<Value>().await.unwrap()
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();

    let body = tokio::time::timeout(Duration::from_secs(5), request).await.unwrap().unwrap();
    assert_eq!(body["message"], "cancelled");
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}

async fn body_size(req: Request, _ctx: RequestContext) -> HandlerResult {
    Ok(ApiResponse::ok(req.raw_body().len().to_string()))
}

#[tokio::test]
async fn oversized_body_is_rejected_with_413() {
    let app = App::builder().route(Route::post(body_size).path("/size")).build();
    let config = ServerConfig::builder()
        .host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .port(0)
        .max_body_bytes(1024)
        .build();
    let bound = Server::new(app, config).bind().await.unwrap();
    let addr = bound.local_addr();
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(bound.serve(shutdown.clone()));

    let client = reqwest::Client::new();
    let small = client
        .post(format!("http://{addr}/v1/size"))
        .header("content-type", "application/octet-stream")
        .body(vec![b'a'; 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(small.status(), 200);
    let body: Value = small.json().await.unwrap();
    assert_eq!(body["message"], "1024");

    let large = client
        .post(format!("http://{addr}/v1/size"))
        .header("content-type", "application/octet-stream")
        .body(vec![b'a'; 64 * 1024])
        .send()
        .await
        .unwrap();
    assert_eq!(large.status(), 413);
    let body: Value = large.json().await.unwrap();
    assert_eq!(body["code"], "ERROR_PAYLOAD_TOO_LARGE");
    assert_eq!(body["status"], 413);

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}
