use axum::extract::{Path, State};
use axum::Json;

use crate::error::Result;
use crate::report::{self, Report, RunExpansion};
use crate::state::SharedState;

/// GET /api/reports
pub async fn get_report(State(state): State<SharedState>) -> Json<Report> {
    let store = state.store.read().await;
    Json(report::build_report(
        store.test_cases().len(),
        store.test_runs(),
    ))
}

/// GET /api/reports/runs/{id} expands one row with failure detail.
pub async fn expand_run(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<RunExpansion>> {
    Ok(Json(report::expand_run(&state, id).await?))
}
