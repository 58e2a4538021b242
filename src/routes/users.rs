use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::activity::{ActivityLevel, ActivitySource};
use crate::error::{DashboardError, Result};
use crate::model::{NewUser, User, UserPatch};
use crate::state::SharedState;
use crate::view::{self, UserRow};

/// GET /api/users
pub async fn list_users(State(state): State<SharedState>) -> Json<Vec<UserRow>> {
    let store = state.store.read().await;
    Json(view::user_rows(&store))
}

/// GET /api/users/{id} returns the full record for the edit form.
pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<User>> {
    let store = state.store.read().await;
    store
        .user(id)
        .cloned()
        .map(Json)
        .ok_or(DashboardError::NotFound { kind: "User", id })
}

/// POST /api/users
pub async fn create_user(
    State(state): State<SharedState>,
    Json(body): Json<NewUser>,
) -> Result<impl IntoResponse> {
    let user = state.store.write().await.create_user(body)?;
    state
        .activity
        .emit(
            ActivitySource::Dashboard,
            ActivityLevel::Info,
            format!("User #{} '{}' created", user.id, user.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(UserRow::from(&user))))
}

/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<UserRow>> {
    let updated = state.store.write().await.update_user(id, patch)?;
    updated
        .as_ref()
        .map(|u| Json(UserRow::from(u)))
        .ok_or(DashboardError::NotFound { kind: "User", id })
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    if state.store.write().await.delete_user(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(DashboardError::NotFound { kind: "User", id })
    }
}
