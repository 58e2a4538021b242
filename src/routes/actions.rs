use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityLevel, ActivitySource};
use crate::error::{DashboardError, Result};
use crate::model::{Action, ActionPatch, NewAction};
use crate::state::SharedState;
use crate::view::{self, ActionRow};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub prompt: String,
    /// Pretty-printed steps document, ready for the action form.
    pub steps: String,
}

/// GET /api/actions
pub async fn list_actions(State(state): State<SharedState>) -> Json<Vec<ActionRow>> {
    let store = state.store.read().await;
    Json(view::action_rows(&store))
}

/// GET /api/actions/{id}
pub async fn get_action(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<Action>> {
    let store = state.store.read().await;
    store
        .action(id)
        .cloned()
        .map(Json)
        .ok_or(DashboardError::NotFound { kind: "Action", id })
}

/// POST /api/actions
pub async fn create_action(
    State(state): State<SharedState>,
    Json(body): Json<NewAction>,
) -> Result<impl IntoResponse> {
    let action = state.store.write().await.create_action(body)?;
    Ok((StatusCode::CREATED, Json(action)))
}

/// PUT /api/actions/{id}
pub async fn update_action(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(patch): Json<ActionPatch>,
) -> Result<Json<Action>> {
    let updated = state.store.write().await.update_action(id, patch)?;
    updated
        .map(Json)
        .ok_or(DashboardError::NotFound { kind: "Action", id })
}

/// DELETE /api/actions/{id}. Test cases keep their reference to it.
pub async fn delete_action(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    if state.store.write().await.delete_action(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(DashboardError::NotFound { kind: "Action", id })
    }
}

/// POST /api/actions/generate asks the agent to draft steps for a prompt.
/// Nothing is saved.
pub async fn generate_action(
    State(state): State<SharedState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    let prompt = body.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(DashboardError::validation("Prompt is required"));
    }

    let steps = match state.client.generate_action_steps(&prompt).await {
        Ok(steps) => steps,
        Err(e) => {
            state
                .activity
                .emit(
                    ActivitySource::Agent,
                    ActivityLevel::Error,
                    format!("Step generation failed: {}", e),
                )
                .await;
            return Err(e);
        }
    };
    let steps = serde_json::to_string_pretty(&steps)?;
    Ok(Json(GenerateResponse { prompt, steps }))
}
