//! Single-test execution and the sequential "run all" sweep.

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::activity::{ActivityLevel, ActivitySource};
use crate::credentials::{CredentialSource, Credentials};
use crate::error::{DashboardError, Result};
use crate::execution::MISSING_CREDENTIALS;
use crate::model::{RunResult, RunUpdate, TestRun};
use crate::state::AppState;
use crate::status::TestStatus;

/// Run one test case against the agent backend.
///
/// The test case is claimed (`running`) under the store lock, the lock is
/// released for the network call, and the terminal status is written back
/// exactly once whichever way the call ended.
pub async fn run_one(
    state: &AppState,
    id: u64,
    credentials: Option<Credentials>,
) -> Result<RunResult> {
    let (test_case, resolved) = {
        let mut store = state.store.write().await;
        let test_case = store.mark_running(id)?;
        let resolved = credentials.or_else(|| store.credentials_for(test_case.user_id));
        (test_case, resolved)
    };

    let label = if test_case.title.is_empty() {
        format!("Test case #{}", id)
    } else {
        format!("Test case #{} '{}'", id, test_case.title)
    };
    state
        .activity
        .emit(
            ActivitySource::Execution,
            ActivityLevel::Info,
            format!("{} started", label),
        )
        .await;

    let outcome = state
        .client
        .execute(&test_case.prompt_steps, resolved.as_ref())
        .await;

    let update = RunUpdate {
        status: outcome.status,
        gif_path: outcome.gif_url.clone(),
        pdf_url: outcome.pdf_url.clone(),
    };
    let persisted = {
        let mut store = state.store.write().await;
        store.apply_run_update(id, update)
    };
    if let Err(e) = &persisted {
        error!("Failed to record outcome of test case #{}: {}", id, e);
    }

    let (level, message) = match (&outcome.status, &outcome.error) {
        (TestStatus::Success, _) => (ActivityLevel::Info, format!("{} passed", label)),
        (_, Some(err)) => (ActivityLevel::Warn, format!("{} failed: {}", label, err)),
        (_, None) => (ActivityLevel::Warn, format!("{} failed", label)),
    };
    info!("{}", message);
    state
        .activity
        .emit(ActivitySource::Execution, level, message)
        .await;

    persisted?;
    Ok(RunResult {
        test_case_id: id,
        status: outcome.status,
        gif_url: outcome.gif_url,
        pdf_url: outcome.pdf_url,
        error: outcome.error,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunAllRequest {
    /// Restrict the sweep to these ids, in this order. All test cases otherwise.
    #[serde(default)]
    pub test_case_ids: Option<Vec<u64>>,
    /// Credentials supplied by the caller, keyed by test case id. They take
    /// precedence over the bound user's.
    #[serde(default)]
    pub credentials: HashMap<u64, Credentials>,
    /// Abort before starting when any test case lacks credentials.
    #[serde(default)]
    pub require_credentials: bool,
    /// Start the sweep and return immediately instead of awaiting the run.
    #[serde(default)]
    pub background: bool,
}

/// Test cases a sweep will attempt, resolved before anything runs.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub entries: Vec<(u64, Option<Credentials>)>,
    pub missing_credentials: Vec<u64>,
}

impl SweepPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub async fn plan_sweep(state: &AppState, request: &RunAllRequest) -> Result<SweepPlan> {
    let store = state.store.read().await;
    let ids: Vec<u64> = match &request.test_case_ids {
        Some(ids) => ids
            .iter()
            .copied()
            .filter(|id| {
                let exists = store.test_case(*id).is_some();
                if !exists {
                    warn!("Sweep: test case #{} does not exist, ignoring", id);
                }
                exists
            })
            .collect(),
        None => store.test_cases().iter().map(|tc| tc.id).collect(),
    };
    if ids.is_empty() {
        return Err(DashboardError::NothingToRun);
    }

    let mut entries = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();
    for id in ids {
        let supplied = request.credentials.get(&id).cloned();
        let complete = match &supplied {
            Some(creds) => creds.is_complete(),
            None => store
                .test_case(id)
                .and_then(|tc| store.credentials_for(tc.user_id))
                .is_some_and(|creds| creds.is_complete()),
        };
        if !complete {
            missing.push(id);
        }
        entries.push((id, supplied));
    }

    if request.require_credentials && !missing.is_empty() {
        return Err(DashboardError::MissingCredentials {
            test_case_ids: missing,
        });
    }

    Ok(SweepPlan {
        entries,
        missing_credentials: missing,
    })
}

/// Mark a sweep as in progress. Only one sweep runs at a time.
pub async fn claim_sweep(state: &AppState, total: usize) -> Result<()> {
    let mut sweep = state.sweep.write().await;
    if sweep.running {
        return Err(DashboardError::AlreadyRunning("A run-all sweep".to_string()));
    }
    sweep.running = true;
    sweep.total = total;
    sweep.current_index = 0;
    sweep.current_test_case_id = None;
    sweep.started_at = Some(Utc::now());
    Ok(())
}

/// Run a claimed plan strictly in order and record the TestRun. Releases
/// the sweep claim on every path.
pub async fn execute_sweep(state: &AppState, plan: SweepPlan) -> Result<TestRun> {
    let total = plan.len();
    state
        .activity
        .emit(
            ActivitySource::Sweep,
            ActivityLevel::Info,
            format!("Run-all started: {} test case(s)", total),
        )
        .await;
    for id in &plan.missing_credentials {
        let message = format!("Test case #{} has no usable credentials and will fail", id);
        warn!("{}", message);
        state
            .activity
            .emit(ActivitySource::Sweep, ActivityLevel::Warn, message)
            .await;
    }

    let mut results = Vec::with_capacity(total);
    for (i, (id, credentials)) in plan.entries.into_iter().enumerate() {
        {
            let mut sweep = state.sweep.write().await;
            sweep.current_index = i;
            sweep.current_test_case_id = Some(id);
        }
        info!("Running test case {}/{}: #{}", i + 1, total, id);

        match run_one(state, id, credentials).await {
            Ok(result) => results.push(result),
            Err(e) => {
                // Deleted mid-sweep, started elsewhere, or unrecordable:
                // attempted but without a classifiable outcome.
                warn!("Test case #{} produced no outcome: {}", id, e);
                results.push(RunResult {
                    test_case_id: id,
                    status: TestStatus::Pending,
                    gif_url: None,
                    pdf_url: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    let appended = {
        let mut store = state.store.write().await;
        store.append_test_run(results)
    };

    {
        let mut sweep = state.sweep.write().await;
        sweep.running = false;
        sweep.current_test_case_id = None;
        sweep.current_index = 0;
        sweep.total = 0;
        if let Ok(run) = &appended {
            sweep.last_run_id = Some(run.id);
        }
    }

    match &appended {
        Ok(run) => {
            state
                .activity
                .emit(
                    ActivitySource::Sweep,
                    ActivityLevel::Info,
                    format!(
                        "Run-all #{} finished: {} passed, {} failed of {}",
                        run.id, run.passed, run.failed, run.total_tests
                    ),
                )
                .await;
        }
        Err(e) => {
            error!("Failed to record test run: {}", e);
            state
                .activity
                .emit(
                    ActivitySource::Sweep,
                    ActivityLevel::Error,
                    format!("Failed to record test run: {}", e),
                )
                .await;
        }
    }
    appended
}

/// Plan, claim and run a sweep in one go.
pub async fn run_all(state: &AppState, request: RunAllRequest) -> Result<TestRun> {
    let plan = plan_sweep(state, &request).await?;
    claim_sweep(state, plan.len()).await?;
    execute_sweep(state, plan).await
}

/// Whether a failed result was caused by absent credentials.
pub fn is_missing_credentials(result: &RunResult) -> bool {
    result.status == TestStatus::Failed && result.error.as_deref() == Some(MISSING_CREDENTIALS)
}
