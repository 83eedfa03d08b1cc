//! The prelude is enough to assemble and exercise an app.

use http::StatusCode;
use serde::Deserialize;
use serde_json::json;
use trellis::prelude::*;
use trellis_test::TestClient;

#[derive(Debug, Deserialize, Validate)]
struct NewTask {
    #[validate(required, max = 20)]
    title: String,
    #[validate(oneof = "low high")]
    priority: String,
}

async fn create_task(req: Request, _ctx: RequestContext) -> HandlerResult {
    let task: NewTask = req.body().await?;
    Ok(ApiResponse::ok("created")
        .with_data(json!({"title": task.title, "priority": task.priority})))
}

fn app() -> App {
    let config = ConfigLoader::new()
        .with_vars([("APP_NAME", "tasks"), ("APPS_ENV", "test")])
        .load()
        .unwrap();
    AppBuilder::from_config(&config)
        .controller(Controller::new("/tasks").route(Route::post(create_task)))
        .build()
}

#[tokio::test]
async fn prelude_builds_working_app() {
    let client = TestClient::new(app());

    client
        .post("/v1/tasks")
        .json(&json!({"title": "write docs", "priority": "high"}))
        .send()
        .await
        .assert_status(StatusCode::OK)
        .assert_json_field("/data/title", &json!("write docs"));

    let rejected = client
        .post("/v1/tasks")
        .json(&json!({"title": "write docs", "priority": "urgent"}))
        .send()
        .await;
    rejected
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY)
        .assert_json_field("/data/0/field", &json!("NewTask.priority"))
        .assert_json_field("/data/0/tag", &json!("oneof"));
}

#[tokio::test]
async fn config_feeds_service_identity() {
    let app = app();
    assert_eq!(app.service_info().label(), "[test] tasks");
}
