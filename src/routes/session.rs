use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::session;
use crate::state::SharedState;
use crate::view::UserRow;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// GET /api/session returns the signed-in user or `null`.
pub async fn current(State(state): State<SharedState>) -> Result<Json<Option<UserRow>>> {
    let store = state.store.read().await;
    let user = session::current_user(&store)?;
    Ok(Json(user.as_ref().map(UserRow::from)))
}

/// POST /api/session
pub async fn login(
    State(state): State<SharedState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<UserRow>> {
    let store = state.store.read().await;
    let user = session::login(&store, &body.email, &body.password)?;
    Ok(Json(UserRow::from(&user)))
}

/// DELETE /api/session
pub async fn logout(State(state): State<SharedState>) -> Result<StatusCode> {
    let store = state.store.read().await;
    session::logout(&store)?;
    Ok(StatusCode::NO_CONTENT)
}
