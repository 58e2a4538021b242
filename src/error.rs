use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub type Result<T> = std::result::Result<T, DashboardError>;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} #{id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("Missing credentials for test case(s): {}", join_ids(.test_case_ids))]
    MissingCredentials { test_case_ids: Vec<u64> },

    #[error("{0} is already running")]
    AlreadyRunning(String),

    #[error("No test cases to run")]
    NothingToRun,

    #[error("Agent backend error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<rusqlite::Error> for DashboardError {
    fn from(e: rusqlite::Error) -> Self {
        DashboardError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(e: serde_json::Error) -> Self {
        DashboardError::Storage(e.to_string())
    }
}

impl DashboardError {
    pub fn validation(message: impl Into<String>) -> Self {
        DashboardError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DashboardError::Validation(_) => StatusCode::BAD_REQUEST,
            DashboardError::NotFound { .. } => StatusCode::NOT_FOUND,
            DashboardError::MissingCredentials { .. } => StatusCode::BAD_REQUEST,
            DashboardError::AlreadyRunning(_) => StatusCode::CONFLICT,
            DashboardError::NothingToRun => StatusCode::BAD_REQUEST,
            DashboardError::Upstream(_) => StatusCode::BAD_GATEWAY,
            DashboardError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DashboardError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "error": self.to_string(),
        });
        if let DashboardError::MissingCredentials { test_case_ids } = &self {
            body["test_case_ids"] = serde_json::json!(test_case_ids);
        }

        (status, axum::Json(body)).into_response()
    }
}
