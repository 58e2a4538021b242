use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
    pub agent_url: String,
    pub store: StoreHealth,
    pub sweep: SweepHealth,
}

#[derive(Serialize)]
pub struct StoreHealth {
    pub users: usize,
    pub actions: usize,
    pub test_cases: usize,
    pub test_runs: usize,
    pub running_test_cases: usize,
}

#[derive(Serialize)]
pub struct SweepHealth {
    pub running: bool,
    pub current_index: usize,
    pub total: usize,
}

/// GET /health
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let store = {
        let store = state.store.read().await;
        StoreHealth {
            users: store.users().len(),
            actions: store.actions().len(),
            test_cases: store.test_cases().len(),
            test_runs: store.test_runs().len(),
            running_test_cases: store
                .test_cases()
                .iter()
                .filter(|tc| tc.status == crate::status::TestStatus::Running)
                .count(),
        }
    };
    let sweep = {
        let sweep = state.sweep.read().await;
        SweepHealth {
            running: sweep.running,
            current_index: sweep.current_index,
            total: sweep.total,
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION"),
        agent_url: state.client.agent_url().to_string(),
        store,
        sweep,
    })
}
