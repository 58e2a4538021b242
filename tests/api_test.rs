mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use testdeck::model::{RunResult, RunUpdate};
use testdeck::persistence::{MemoryKv, Persistence};
use testdeck::server::build_router;
use testdeck::state::SharedState;
use testdeck::status::TestStatus;

use common::{app_state, dead_url, spawn_mock_agent, test_config};

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn offline_app(dir: &TempDir) -> (Router, SharedState) {
    let state = app_state(
        test_config(dir.path(), dead_url().await),
        Persistence::new(MemoryKv::new()),
    );
    (build_router(state.clone()), state)
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (router, _) = offline_app(&dir).await;
    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"]["test_cases"], 2);
    assert_eq!(body["sweep"]["running"], false);
}

#[tokio::test]
async fn test_user_listing_hides_passwords() {
    let dir = TempDir::new().unwrap();
    let (router, _) = offline_app(&dir).await;
    let (status, body) = send(&router, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert!(body[0].get("password").is_none());

    let (status, body) = send(&router, Method::GET, "/api/users/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["password"], "password123");
}

#[tokio::test]
async fn test_validation_and_not_found_errors() {
    let dir = TempDir::new().unwrap();
    let (router, state) = offline_app(&dir).await;

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/users",
        Some(json!({ "name": "X", "email": "not-an-email", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("valid email"));
    assert_eq!(state.store.read().await.users().len(), 2);

    let (status, body) = send(&router, Method::GET, "/api/users/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User #99 not found");

    let (status, _) = send(
        &router,
        Method::PUT,
        "/api/actions/99",
        Some(json!({ "prompt": "p" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_not_json_prompt_rejected_over_http() {
    let dir = TempDir::new().unwrap();
    let (router, state) = offline_app(&dir).await;
    let (status, body) = send(
        &router,
        Method::POST,
        "/api/test_cases",
        Some(json!({ "title": "t", "user_id": 1, "actions": [], "prompt": "not json" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(state.store.read().await.test_cases().len(), 2);

    // The same prompt previews as text.
    let (status, body) = send(
        &router,
        Method::POST,
        "/api/test_cases/preview",
        Some(json!({ "actions": [2], "prompt": "not json" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "text");
    assert_eq!(body["step_count"], 1);
    assert!(body["text"]
        .as_str()
        .unwrap()
        .ends_with("1. navigate /dashboard"));
}

#[tokio::test]
async fn test_delete_action_leaves_placeholder() {
    let dir = TempDir::new().unwrap();
    let (router, _) = offline_app(&dir).await;
    let (status, _) = send(&router, Method::DELETE, "/api/actions/2", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&router, Method::GET, "/api/test_cases/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action_labels"][1], "(deleted action #2)");
    assert_eq!(body["badge"], "");
}

#[tokio::test]
async fn test_run_single_test_case() {
    let dir = TempDir::new().unwrap();
    let (url, agent) = spawn_mock_agent("success").await;
    let state = app_state(
        test_config(dir.path(), url),
        Persistence::new(MemoryKv::new()),
    );
    let router = build_router(state.clone());

    let (status, body) = send(&router, Method::POST, "/api/test_cases/2/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["pdf_url"], "/media/run.pdf");
    assert_eq!(agent.calls(), 1);

    let (_, card) = send(&router, Method::GET, "/api/test_cases/2", None).await;
    assert_eq!(card["badge"], "badge-success");

    let (status, _) = send(&router, Method::POST, "/api/test_cases/42/run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_rejects_double_start() {
    let dir = TempDir::new().unwrap();
    let (router, state) = offline_app(&dir).await;
    state.store.write().await.mark_running(1).unwrap();

    let (status, body) = send(&router, Method::POST, "/api/test_cases/1/run", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Test case #1 is already running");
}

#[tokio::test]
async fn test_run_all_over_http() {
    let dir = TempDir::new().unwrap();
    let (router, _) = offline_app(&dir).await;

    let (status, body) = send(&router, Method::POST, "/api/run_all_tests", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_tests"], 2);
    assert_eq!(body["failed"], 2);

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/run_all_tests",
        Some(json!({ "test_case_ids": [99] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No test cases to run");

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/run_all_tests",
        Some(json!({ "credentials": { "1": { "username": "", "password": "" } }, "require_credentials": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["test_case_ids"], json!([1]));

    let (_, status_body) = send(&router, Method::GET, "/api/run_all_tests/status", None).await;
    assert_eq!(status_body["running"], false);
    assert_eq!(status_body["last_run_id"], 1);

    let (_, report) = send(&router, Method::GET, "/api/reports", None).await;
    assert_eq!(report["summary"]["total_runs"], 1);
    assert_eq!(report["runs"][0]["success_rate"], 0);
}

#[tokio::test]
async fn test_report_expansion_falls_back_when_details_unavailable() {
    let dir = TempDir::new().unwrap();
    let (router, state) = offline_app(&dir).await;
    {
        let mut store = state.store.write().await;
        let failed = |id| RunResult {
            test_case_id: id,
            status: TestStatus::Failed,
            gif_url: None,
            pdf_url: None,
            error: Some("boom".to_string()),
        };
        store.append_test_run(vec![failed(1), failed(2)]).unwrap();
    }

    let (status, body) = send(&router, Method::GET, "/api/reports/runs/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run"]["failed"], 2);
    assert_eq!(body["detail"]["kind"], "unavailable");
    assert_eq!(body["detail"]["message"], "2 failed tests, details unavailable");

    let (status, body) = send(&router, Method::GET, "/api/test_runs/1/details", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failures"].as_array().unwrap().len(), 2);

    let (status, _) = send(&router, Method::GET, "/api/reports/runs/5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_report_expansion_uses_detail_endpoint() {
    let dir = TempDir::new().unwrap();
    let (url, _agent) = spawn_mock_agent("success").await;
    let state = app_state(
        test_config(dir.path(), url),
        Persistence::new(MemoryKv::new()),
    );
    state.store.write().await.append_test_run(vec![]).unwrap();
    let router = build_router(state);

    let (status, body) = send(&router, Method::GET, "/api/reports/runs/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"]["kind"], "detailed");
    assert_eq!(body["detail"]["failures"][0]["error"], "timeout");
}

#[tokio::test]
async fn test_generate_action_steps() {
    let dir = TempDir::new().unwrap();
    let (url, _agent) = spawn_mock_agent("success").await;
    let state = app_state(
        test_config(dir.path(), url),
        Persistence::new(MemoryKv::new()),
    );
    let router = build_router(state.clone());

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/actions/generate",
        Some(json!({ "prompt": "settings" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let steps: Value = serde_json::from_str(body["steps"].as_str().unwrap()).unwrap();
    assert_eq!(steps["steps"][0]["url"], "/settings");
    assert_eq!(state.store.read().await.actions().len(), 2);
}

#[tokio::test]
async fn test_generate_upstream_failure_is_502() {
    let dir = TempDir::new().unwrap();
    let (router, _) = offline_app(&dir).await;
    let (status, _) = send(
        &router,
        Method::POST,
        "/api/actions/generate",
        Some(json!({ "prompt": "settings" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_session_round_trip() {
    let dir = TempDir::new().unwrap();
    let (router, _) = offline_app(&dir).await;

    let (_, body) = send(&router, Method::GET, "/api/session", None).await;
    assert!(body.is_null());

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/session",
        Some(json!({ "email": "jane.smith@example.com", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/session",
        Some(json!({ "email": "jane.smith@example.com", "password": "password456" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 2);

    let (_, body) = send(&router, Method::GET, "/api/session", None).await;
    assert_eq!(body["name"], "Jane Smith");

    let (status, _) = send(&router, Method::DELETE, "/api/session", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&router, Method::GET, "/api/session", None).await;
    assert!(body.is_null());
}

#[tokio::test]
async fn test_run_update_reflected_in_cards() {
    let dir = TempDir::new().unwrap();
    let (router, state) = offline_app(&dir).await;
    state
        .store
        .write()
        .await
        .apply_run_update(
            1,
            RunUpdate {
                status: TestStatus::Failed,
                gif_path: Some("/media/1.gif".to_string()),
                pdf_url: None,
            },
        )
        .unwrap();

    let (_, cards) = send(&router, Method::GET, "/api/test_cases", None).await;
    assert_eq!(cards[0]["status"], "failed");
    assert_eq!(cards[0]["badge"], "badge-failure");
    assert_eq!(cards[0]["gif_path"], "/media/1.gif");
}

#[tokio::test]
async fn test_activity_history_records_runs() {
    let dir = TempDir::new().unwrap();
    let (router, _) = offline_app(&dir).await;
    send(&router, Method::POST, "/api/test_cases/1/run", None).await;

    let (status, body) = send(&router, Method::GET, "/logs/history?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert!(!entries.is_empty());
    assert_eq!(entries[0]["source"], "execution");
    assert!(entries[0]["message"].as_str().unwrap().contains("failed"));
}

#[tokio::test]
async fn test_activity_history_filters_by_source_and_level() {
    let dir = TempDir::new().unwrap();
    let (router, _) = offline_app(&dir).await;
    send(&router, Method::POST, "/api/test_cases/1/run", None).await;

    let (_, all) = send(&router, Method::GET, "/logs/history?source=execution", None).await;
    assert_eq!(all["total"], 2);
    assert_eq!(all["source"], "execution");

    let (status, body) = send(
        &router,
        Method::GET,
        "/logs/history?source=execution&level=warn",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["level"], "warn");
    assert!(entries[0]["message"].as_str().unwrap().contains("failed"));

    let (_, sweep) = send(&router, Method::GET, "/logs/history?source=sweep", None).await;
    assert_eq!(sweep["total"], 0);
    assert!(sweep["entries"].as_array().unwrap().is_empty());

    let (status, _) = send(&router, Method::GET, "/logs/history?source=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
