//! Canonical test status vocabulary.
//!
//! Every status string that arrives from the agent backend or from a legacy
//! export is translated here; nothing else in the crate compares raw strings.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Pending,
    Running,
    #[serde(alias = "passed", alias = "pass")]
    Success,
    #[serde(alias = "fail", alias = "error")]
    Failed,
}

impl TestStatus {
    /// Translate a status reported by the agent backend. Anything that is not
    /// a recognized success spelling counts as a failure.
    pub fn from_backend(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" | "passed" | "pass" | "ok" | "completed" => TestStatus::Success,
            _ => TestStatus::Failed,
        }
    }

    /// Whether a run can end in this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Success | TestStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Running => "running",
            TestStatus::Success => "success",
            TestStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_success_spellings() {
        for raw in ["success", "passed", "PASS", " ok ", "Completed"] {
            assert_eq!(TestStatus::from_backend(raw), TestStatus::Success, "{raw}");
        }
    }

    #[test]
    fn test_backend_failure_spellings() {
        for raw in ["failed", "fail", "error", "", "running", "weird"] {
            assert_eq!(TestStatus::from_backend(raw), TestStatus::Failed, "{raw}");
        }
    }

    #[test]
    fn test_legacy_spellings_deserialize() {
        let s: TestStatus = serde_json::from_str("\"passed\"").unwrap();
        assert_eq!(s, TestStatus::Success);
        let s: TestStatus = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(s, TestStatus::Failed);
    }

    #[test]
    fn test_serializes_canonical() {
        assert_eq!(
            serde_json::to_string(&TestStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(TestStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_terminal() {
        assert!(TestStatus::Success.is_terminal());
        assert!(TestStatus::Failed.is_terminal());
        assert!(!TestStatus::Running.is_terminal());
        assert!(!TestStatus::Pending.is_terminal());
    }
}
