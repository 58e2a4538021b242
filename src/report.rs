//! Run history summaries and per-run failure detail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DashboardError, Result};
use crate::model::TestRun;
use crate::state::AppState;
use crate::store::EntityStore;

/// One failed test inside a run, as served by a detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    #[serde(default, alias = "testCaseId")]
    pub test_case_id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "message")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_test_cases: usize,
    pub total_runs: usize,
    pub total_tests: u64,
    pub total_passed: u64,
    pub total_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    /// Whole percent.
    pub success_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub runs: Vec<RunRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FailureDetail {
    Detailed { failures: Vec<RunFailure> },
    Unavailable { failed: u32, message: String },
}

impl FailureDetail {
    pub fn unavailable(failed: u32) -> Self {
        FailureDetail::Unavailable {
            failed,
            message: format!("{} failed tests, details unavailable", failed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunExpansion {
    pub run: RunRow,
    pub detail: FailureDetail,
}

pub fn success_rate(passed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(passed) / f64::from(total) * 100.0).round() as u32
}

impl From<&TestRun> for RunRow {
    fn from(run: &TestRun) -> Self {
        RunRow {
            id: run.id,
            timestamp: run.timestamp,
            total_tests: run.total_tests,
            passed: run.passed,
            failed: run.failed,
            success_rate: success_rate(run.passed, run.total_tests),
        }
    }
}

/// Summary counts plus one row per run, newest first.
pub fn build_report(test_case_count: usize, runs: &[TestRun]) -> Report {
    let summary = ReportSummary {
        total_test_cases: test_case_count,
        total_runs: runs.len(),
        total_tests: runs.iter().map(|r| u64::from(r.total_tests)).sum(),
        total_passed: runs.iter().map(|r| u64::from(r.passed)).sum(),
        total_failed: runs.iter().map(|r| u64::from(r.failed)).sum(),
    };
    let mut rows: Vec<RunRow> = runs.iter().map(RunRow::from).collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    Report {
        summary,
        runs: rows,
    }
}

/// Failed results of a run, titled from the store. Deleted test cases get a
/// placeholder title.
pub fn local_failures(store: &EntityStore, run: &TestRun) -> Vec<RunFailure> {
    run.failed_results()
        .map(|result| {
            let title = match store.test_case(result.test_case_id) {
                Some(tc) if !tc.title.is_empty() => tc.title.clone(),
                Some(tc) => format!("Test Case #{}", tc.id),
                None => format!("(deleted test case #{})", result.test_case_id),
            };
            RunFailure {
                test_case_id: Some(result.test_case_id),
                title: Some(title),
                error: result.error.clone(),
            }
        })
        .collect()
}

/// Expand one report row. The detail endpoint is only contacted here; any
/// failure there degrades to the summary count.
pub async fn expand_run(state: &AppState, id: u64) -> Result<RunExpansion> {
    let run = {
        let store = state.store.read().await;
        store
            .test_run(id)
            .map(RunRow::from)
            .ok_or(DashboardError::NotFound {
                kind: "Test run",
                id,
            })?
    };

    let detail = match state.client.fetch_run_details(id).await {
        Ok(failures) => FailureDetail::Detailed { failures },
        Err(e) => {
            warn!("Details for test run #{} unavailable: {}", id, e);
            FailureDetail::unavailable(run.failed)
        }
    };
    Ok(RunExpansion { run, detail })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunResult;
    use crate::persistence::{MemoryKv, Persistence};
    use crate::status::TestStatus;
    use chrono::TimeZone;

    fn run(id: u64, ts: i64, passed: u32, failed: u32) -> TestRun {
        TestRun {
            id,
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            total_tests: passed + failed,
            passed,
            failed,
            results: vec![],
        }
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(success_rate(0, 0), 0);
        assert_eq!(success_rate(1, 2), 50);
        assert_eq!(success_rate(2, 3), 67);
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(5, 5), 100);
    }

    #[test]
    fn test_report_newest_first_with_totals() {
        let runs = vec![run(1, 100, 1, 1), run(2, 300, 2, 0), run(3, 300, 0, 3)];
        let report = build_report(4, &runs);
        let ids: Vec<u64> = report.runs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(report.summary.total_test_cases, 4);
        assert_eq!(report.summary.total_runs, 3);
        assert_eq!(report.summary.total_tests, 7);
        assert_eq!(report.summary.total_passed, 3);
        assert_eq!(report.summary.total_failed, 4);
    }

    #[test]
    fn test_unavailable_message() {
        match FailureDetail::unavailable(3) {
            FailureDetail::Unavailable { failed, message } => {
                assert_eq!(failed, 3);
                assert_eq!(message, "3 failed tests, details unavailable");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_local_failures_titles() {
        let store = EntityStore::open(Persistence::new(MemoryKv::new())).unwrap();
        let failed = |id| RunResult {
            test_case_id: id,
            status: TestStatus::Failed,
            gif_url: None,
            pdf_url: None,
            error: Some("boom".to_string()),
        };
        let run = TestRun::from_results(1, Utc::now(), vec![failed(1), failed(77)]);
        let failures = local_failures(&store, &run);
        assert_eq!(failures.len(), 2);
        assert_eq!(
            failures[0].title.as_deref(),
            store.test_case(1).map(|tc| tc.title.as_str())
        );
        assert_eq!(failures[1].title.as_deref(), Some("(deleted test case #77)"));
        assert_eq!(failures[1].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_failure_accepts_camel_case() {
        let parsed: RunFailure =
            serde_json::from_str(r#"{"testCaseId": 4, "message": "timeout"}"#).unwrap();
        assert_eq!(parsed.test_case_id, Some(4));
        assert_eq!(parsed.error.as_deref(), Some("timeout"));
        assert!(parsed.title.is_none());
    }
}
