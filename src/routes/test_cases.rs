use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::composer::{self, Preview};
use crate::credentials::Credentials;
use crate::error::{DashboardError, Result};
use crate::model::{NewTestCase, RunResult, TestCasePatch};
use crate::runner;
use crate::state::SharedState;
use crate::view::{self, TestCaseCard, TestCaseDetail};

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub actions: Vec<u64>,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunOneRequest {
    /// Used instead of the bound user's credentials.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Parse an optional JSON body; an empty body means defaults.
pub(crate) fn optional_json<T>(body: &Bytes) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| DashboardError::validation(format!("Invalid request body: {}", e)))
}

/// GET /api/test_cases
pub async fn list_test_cases(State(state): State<SharedState>) -> Json<Vec<TestCaseCard>> {
    let store = state.store.read().await;
    Json(view::test_case_cards(&store))
}

/// GET /api/test_cases/{id}
pub async fn get_test_case(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<TestCaseDetail>> {
    let store = state.store.read().await;
    let test_case = store
        .test_case(id)
        .ok_or(DashboardError::NotFound { kind: "Test case", id })?;
    Ok(Json(view::test_case_detail(&store, test_case)))
}

/// POST /api/test_cases
pub async fn create_test_case(
    State(state): State<SharedState>,
    Json(body): Json<NewTestCase>,
) -> Result<impl IntoResponse> {
    let mut store = state.store.write().await;
    let created = store.create_test_case(body)?;
    Ok((
        StatusCode::CREATED,
        Json(view::test_case_detail(&store, &created)),
    ))
}

/// PUT /api/test_cases/{id}
pub async fn update_test_case(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(patch): Json<TestCasePatch>,
) -> Result<Json<TestCaseDetail>> {
    let mut store = state.store.write().await;
    let updated = store
        .update_test_case(id, patch)?
        .ok_or(DashboardError::NotFound { kind: "Test case", id })?;
    Ok(Json(view::test_case_detail(&store, &updated)))
}

/// DELETE /api/test_cases/{id}
pub async fn delete_test_case(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    if state.store.write().await.delete_test_case(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(DashboardError::NotFound { kind: "Test case", id })
    }
}

/// POST /api/test_cases/preview shows the script a selection would produce.
pub async fn preview_test_case(
    State(state): State<SharedState>,
    Json(body): Json<PreviewRequest>,
) -> Result<Json<Preview>> {
    let store = state.store.read().await;
    let preview = composer::preview(&body.actions, store.actions(), &body.prompt)?;
    Ok(Json(preview))
}

/// POST /api/test_cases/{id}/run waits for the agent and returns the outcome.
pub async fn run_test_case(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<Json<RunResult>> {
    let request: RunOneRequest = optional_json(&body)?;
    // Detached so the terminal status is written even if the caller hangs up.
    let run_state = state.clone();
    let result = tokio::spawn(async move {
        runner::run_one(&run_state, id, request.credentials).await
    })
    .await
    .map_err(|e| DashboardError::Storage(format!("Run task failed: {}", e)))??;
    Ok(Json(result))
}
