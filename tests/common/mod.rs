#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use testdeck::config::{parse_base_url, DashboardConfig};
use testdeck::persistence::Persistence;
use testdeck::state::AppState;
use testdeck::store::EntityStore;

/// Canned `/run` reply overriding the default success-shaped body.
#[derive(Clone)]
pub struct CannedReply {
    pub status: StatusCode,
    pub body: String,
}

/// In-process stand-in for the web-agent backend.
#[derive(Default)]
pub struct MockAgent {
    pub run_calls: AtomicUsize,
    pub usernames: Mutex<Vec<String>>,
    /// Reported as `test_status` for every /run call.
    pub status: Mutex<String>,
    pub reply: Mutex<Option<CannedReply>>,
    /// How long each /run call takes.
    pub delay: Mutex<Duration>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockAgent {
    pub fn calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn reply_with(&self, status: StatusCode, body: &str) {
        *self.reply.lock().unwrap() = Some(CannedReply {
            status,
            body: body.to_string(),
        });
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }
}

async fn run_handler(
    State(agent): State<Arc<MockAgent>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    agent.run_calls.fetch_add(1, Ordering::SeqCst);
    let now = agent.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    agent.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let username = body["username"].as_str().unwrap_or_default().to_string();
    agent.usernames.lock().unwrap().push(username);
    let delay = *agent.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    agent.in_flight.fetch_sub(1, Ordering::SeqCst);

    if let Some(reply) = agent.reply.lock().unwrap().clone() {
        return (reply.status, reply.body).into_response();
    }
    let status = agent.status.lock().unwrap().clone();
    Json(serde_json::json!({
        "test_status": status,
        "gif_url": "/media/run.gif",
        "pdf_url": "/media/run.pdf",
    }))
    .into_response()
}

async fn generate_handler(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    let prompt = body["prompt"].as_str().unwrap_or_default();
    Json(serde_json::json!({
        "steps": [{ "action": "navigate", "url": format!("/{}", prompt) }]
    }))
}

async fn details_handler(Path(id): Path<u64>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "failures": [{ "test_case_id": 1, "title": format!("run {}", id), "error": "timeout" }]
    }))
}

/// Serve a mock agent on an ephemeral port. Returns its base URL.
pub async fn spawn_mock_agent(status: &str) -> (Url, Arc<MockAgent>) {
    let agent = Arc::new(MockAgent {
        status: Mutex::new(status.to_string()),
        ..Default::default()
    });
    let router = Router::new()
        .route("/run", post(run_handler))
        .route("/generate-action-json", post(generate_handler))
        .route("/api/test_runs/{id}/details", get(details_handler))
        .with_state(agent.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (parse_base_url(&format!("http://{}", addr)).unwrap(), agent)
}

/// A base URL nothing is listening on.
pub async fn dead_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    parse_base_url(&format!("http://{}", addr)).unwrap()
}

pub fn test_config(data_dir: &FsPath, agent_url: Url) -> DashboardConfig {
    DashboardConfig {
        port: 0,
        data_dir: data_dir.to_path_buf(),
        details_url: agent_url.clone(),
        agent_url,
        import: None,
        seed: true,
    }
}

pub fn app_state(config: DashboardConfig, persistence: Persistence) -> Arc<AppState> {
    let store = EntityStore::open(persistence).unwrap();
    Arc::new(AppState::new(config, store).unwrap())
}
