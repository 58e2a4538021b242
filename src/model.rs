use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::TestStatus;

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    /// Stored and transmitted in plaintext; the agent backend logs in with it.
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: u64,
    pub prompt: String,
    /// JSON text, usually `{ "steps": [ {action, ...} ] }`. Only syntax is checked.
    #[serde(alias = "stepsJson")]
    pub steps: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub user_id: u64,
    /// Action ids, in selection order.
    #[serde(default)]
    pub actions: Vec<u64>,
    #[serde(alias = "promptSteps")]
    pub prompt_steps: String,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default)]
    pub gif_path: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(alias = "testCaseId")]
    pub test_case_id: u64,
    pub status: TestStatus,
    #[serde(default, alias = "gif_path", skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "totalTests")]
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    #[serde(default)]
    pub results: Vec<RunResult>,
}

impl TestRun {
    /// Fold per-test outcomes, in attempt order, into a run record.
    pub fn from_results(id: u64, timestamp: DateTime<Utc>, results: Vec<RunResult>) -> Self {
        let passed = results
            .iter()
            .filter(|r| r.status == TestStatus::Success)
            .count() as u32;
        let failed = results
            .iter()
            .filter(|r| r.status == TestStatus::Failed)
            .count() as u32;
        TestRun {
            id,
            timestamp,
            total_tests: results.len() as u32,
            passed,
            failed,
            results,
        }
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &RunResult> {
        self.results
            .iter()
            .filter(|r| r.status == TestStatus::Failed)
    }
}

// ============================================================================
// Inputs and patches
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAction {
    pub prompt: String,
    pub steps: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionPatch {
    pub prompt: Option<String>,
    pub steps: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTestCase {
    pub title: String,
    pub user_id: u64,
    #[serde(default)]
    pub actions: Vec<u64>,
    /// Free-form prompt merged after the selected actions' steps.
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestCasePatch {
    pub title: Option<String>,
    pub user_id: Option<u64>,
    pub actions: Option<Vec<u64>>,
    pub prompt_steps: Option<String>,
}

/// Side effects of one execution on its test case.
#[derive(Debug, Clone, PartialEq)]
pub struct RunUpdate {
    pub status: TestStatus,
    pub gif_path: Option<String>,
    pub pdf_url: Option<String>,
}
