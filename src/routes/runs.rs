use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::{DashboardError, Result};
use crate::model::TestRun;
use crate::report::{self, RunFailure};
use crate::routes::test_cases::optional_json;
use crate::runner::{self, RunAllRequest};
use crate::state::{SharedState, SweepState};

#[derive(Debug, Serialize)]
pub struct SweepStarted {
    pub ok: bool,
    pub message: String,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct RunDetails {
    pub run_id: u64,
    pub failures: Vec<RunFailure>,
}

/// POST /api/run_all_tests
///
/// Awaits the whole sweep and returns the TestRun, unless `background` is
/// set, in which case the sweep is spawned and progress is polled from
/// `/api/run_all_tests/status`.
pub async fn run_all_tests(State(state): State<SharedState>, body: Bytes) -> Result<Response> {
    let request: RunAllRequest = optional_json(&body)?;
    let background = request.background;

    let plan = runner::plan_sweep(&state, &request).await?;
    let total = plan.len();
    runner::claim_sweep(&state, total).await?;

    // The sweep owns its task so a dropped connection cannot strand the claim.
    let sweep_state = state.clone();
    let handle = tokio::spawn(async move { runner::execute_sweep(&sweep_state, plan).await });

    if !background {
        let run = handle
            .await
            .map_err(|e| DashboardError::Storage(format!("Sweep task failed: {}", e)))??;
        return Ok(Json(run).into_response());
    }

    tokio::spawn(async move {
        match handle.await {
            Ok(Err(e)) => error!("Background sweep failed: {}", e),
            Err(e) => error!("Background sweep task panicked: {}", e),
            Ok(Ok(_)) => {}
        }
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(SweepStarted {
            ok: true,
            message: "Run-all started".to_string(),
            total,
        }),
    )
        .into_response())
}

/// GET /api/run_all_tests/status
pub async fn run_all_status(State(state): State<SharedState>) -> Json<SweepState> {
    Json(state.sweep.read().await.clone())
}

/// GET /api/test_runs, newest first.
pub async fn list_test_runs(State(state): State<SharedState>) -> Json<Vec<TestRun>> {
    let store = state.store.read().await;
    let mut runs = store.test_runs().to_vec();
    runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    Json(runs)
}

/// GET /api/test_runs/{id}
pub async fn get_test_run(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<TestRun>> {
    let store = state.store.read().await;
    store
        .test_run(id)
        .cloned()
        .map(Json)
        .ok_or(DashboardError::NotFound { kind: "Test run", id })
}

/// GET /api/test_runs/{id}/details lists the failed results of a run.
pub async fn test_run_details(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<RunDetails>> {
    let store = state.store.read().await;
    let run = store
        .test_run(id)
        .ok_or(DashboardError::NotFound { kind: "Test run", id })?;
    Ok(Json(RunDetails {
        run_id: id,
        failures: report::local_failures(&store, run),
    }))
}
