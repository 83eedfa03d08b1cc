//! Racing handlers against the deadline never produces two responses or a
//! failure report for a request that already timed out.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use proptest::prelude::*;
use trellis_core::{HandlerResult, HttpError, Notifier, RequestContext};
use trellis_extract::Request;
use trellis_notify::{Fanout, MemorySink};
use trellis_server::{App, Route};

fn app(timeout_ms: u64, work_ms: u64, sink: Arc<MemorySink>) -> App {
    let notifier: Arc<dyn Notifier> = Arc::new(Fanout::new().with_sink(sink));
    let handler = move |_req: Request, _ctx: RequestContext| async move {
        tokio::time::sleep(Duration::from_millis(work_ms)).await;
        let result: HandlerResult = Err(HttpError::bad_request("late", "LATE").into());
        result
    };
    App::builder()
        .api_timeout(Duration::from_millis(timeout_ms))
        .notifier(notifier)
        .route(Route::get(handler).path("/work"))
        .build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn deadline_race_writes_once(timeout_ms in 40u64..120, work_ms in 0u64..160) {
        // Skip races too close to call on a loaded machine.
        prop_assume!(timeout_ms.abs_diff(work_ms) >= 30);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (status, delivered) = runtime.block_on(async {
            let sink = Arc::new(MemorySink::new());
            let app = app(timeout_ms, work_ms, sink.clone());
            let request = http::Request::get("/v1/work").body(bytes::Bytes::new()).unwrap();
            let response = app.handle(request).await;
            // Give a late handler time to finish and any stray notification to land.
            tokio::time::sleep(Duration::from_millis(200)).await;
            (response.status(), sink.len())
        });

        if work_ms < timeout_ms {
            prop_assert_eq!(status, StatusCode::BAD_REQUEST);
            prop_assert_eq!(delivered, 1);
        } else {
            prop_assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
            prop_assert_eq!(delivered, 0);
        }
    }
}
