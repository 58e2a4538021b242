use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::{actions, health, logs, reports, runs, session, test_cases, users};
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health::health))
        // Users
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Actions
        .route(
            "/api/actions",
            get(actions::list_actions).post(actions::create_action),
        )
        .route("/api/actions/generate", post(actions::generate_action))
        .route(
            "/api/actions/{id}",
            get(actions::get_action)
                .put(actions::update_action)
                .delete(actions::delete_action),
        )
        // Test cases
        .route(
            "/api/test_cases",
            get(test_cases::list_test_cases).post(test_cases::create_test_case),
        )
        .route("/api/test_cases/preview", post(test_cases::preview_test_case))
        .route(
            "/api/test_cases/{id}",
            get(test_cases::get_test_case)
                .put(test_cases::update_test_case)
                .delete(test_cases::delete_test_case),
        )
        .route("/api/test_cases/{id}/run", post(test_cases::run_test_case))
        // Sweeps and run history
        .route("/api/run_all_tests", post(runs::run_all_tests))
        .route("/api/run_all_tests/status", get(runs::run_all_status))
        .route("/api/test_runs", get(runs::list_test_runs))
        .route("/api/test_runs/{id}", get(runs::get_test_run))
        .route("/api/test_runs/{id}/details", get(runs::test_run_details))
        // Reports
        .route("/api/reports", get(reports::get_report))
        .route("/api/reports/runs/{id}", get(reports::expand_run))
        // Session
        .route(
            "/api/session",
            get(session::current)
                .post(session::login)
                .delete(session::logout),
        )
        // Activity
        .route("/logs/history", get(logs::log_history))
        .route("/logs/stream", get(logs::log_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(cors)
        .with_state(state)
}
