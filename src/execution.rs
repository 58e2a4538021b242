use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::{endpoint, AUX_REQUEST_TIMEOUT_SECS};
use crate::credentials::Credentials;
use crate::error::{DashboardError, Result};
use crate::report::RunFailure;
use crate::status::TestStatus;

pub const MISSING_CREDENTIALS: &str = "missing credentials";

/// Normalized result of one `/run` call. Always terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub status: TestStatus,
    pub gif_url: Option<String>,
    pub pdf_url: Option<String>,
    pub error: Option<String>,
    /// False when the request was never sent.
    pub attempted: bool,
}

impl ExecutionOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Failed,
            gif_url: None,
            pdf_url: None,
            error: Some(error.into()),
            attempted: true,
        }
    }

    pub fn missing_credentials() -> Self {
        Self {
            attempted: false,
            ..Self::failed(MISSING_CREDENTIALS)
        }
    }
}

#[derive(Serialize)]
struct RunRequest<'a> {
    prompt: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct RunResponse {
    test_status: Option<String>,
    status: Option<String>,
    gif_url: Option<String>,
    pdf_url: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DetailsResponse {
    Wrapped { failures: Vec<RunFailure> },
    Bare(Vec<RunFailure>),
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// HTTP client for the external web-agent backend.
pub struct ExecutionClient {
    /// No total timeout: a run lasts as long as the agent takes.
    run_http: reqwest::Client,
    aux_http: reqwest::Client,
    agent_url: Url,
    details_url: Url,
}

impl ExecutionClient {
    pub fn new(agent_url: Url, details_url: Url) -> Result<Self> {
        let run_http = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| DashboardError::Upstream(format!("Failed to create HTTP client: {}", e)))?;
        let aux_http = reqwest::Client::builder()
            .timeout(Duration::from_secs(AUX_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DashboardError::Upstream(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            run_http,
            aux_http,
            agent_url,
            details_url,
        })
    }

    pub fn agent_url(&self) -> &Url {
        &self.agent_url
    }

    /// Run one instruction payload. Every failure mode, including absent
    /// credentials, comes back as a `failed` outcome.
    pub async fn execute(&self, prompt: &str, credentials: Option<&Credentials>) -> ExecutionOutcome {
        let Some(creds) = credentials.filter(|c| c.is_complete()) else {
            return ExecutionOutcome::missing_credentials();
        };

        let url = endpoint(&self.agent_url, "run");
        debug!("POST {} as {}", url, creds.username);
        let resp = match self
            .run_http
            .post(&url)
            .json(&RunRequest {
                prompt,
                username: &creds.username,
                password: &creds.password,
            })
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Agent request failed: {}", e);
                return ExecutionOutcome::failed(format!("Agent unreachable: {}", e));
            }
        };

        let http_status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read agent response: {}", e);
                return ExecutionOutcome::failed(format!("Failed to read response: {}", e));
            }
        };

        if !http_status.is_success() {
            let detail = error_message(&body).unwrap_or_else(|| http_status.to_string());
            warn!("Agent returned {}: {}", http_status, detail);
            return ExecutionOutcome::failed(format!("HTTP {}: {}", http_status.as_u16(), detail));
        }

        let parsed: RunResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Malformed agent response: {}", e);
                return ExecutionOutcome::failed(format!("Malformed response: {}", e));
            }
        };

        let Some(raw_status) = parsed.test_status.or(parsed.status) else {
            warn!("Agent response has no status field");
            return ExecutionOutcome::failed("Response has no status field");
        };

        let status = TestStatus::from_backend(&raw_status);
        let error = match status {
            TestStatus::Success => None,
            _ => Some(
                parsed
                    .error
                    .or(parsed.message)
                    .unwrap_or_else(|| format!("Agent reported '{}'", raw_status)),
            ),
        };
        ExecutionOutcome {
            status,
            gif_url: parsed.gif_url,
            pdf_url: parsed.pdf_url,
            error,
            attempted: true,
        }
    }

    /// Ask the agent to turn a natural-language prompt into a steps document.
    pub async fn generate_action_steps(&self, prompt: &str) -> Result<serde_json::Value> {
        let url = endpoint(&self.agent_url, "generate-action-json");
        let resp = self
            .aux_http
            .post(&url)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| DashboardError::Upstream(e.to_string()))?;

        let http_status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| DashboardError::Upstream(e.to_string()))?;
        if !http_status.is_success() {
            let detail = error_message(&body).unwrap_or_else(|| http_status.to_string());
            return Err(DashboardError::Upstream(detail));
        }
        serde_json::from_str(&body)
            .map_err(|e| DashboardError::Upstream(format!("Malformed steps JSON: {}", e)))
    }

    /// Failure detail for one run from the detail endpoint.
    pub async fn fetch_run_details(&self, run_id: u64) -> Result<Vec<RunFailure>> {
        let url = endpoint(
            &self.details_url,
            &format!("api/test_runs/{}/details", run_id),
        );
        let resp = self
            .aux_http
            .get(&url)
            .send()
            .await
            .map_err(|e| DashboardError::Upstream(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DashboardError::Upstream(format!(
                "Detail endpoint returned {}",
                resp.status()
            )));
        }
        let parsed: DetailsResponse = resp
            .json()
            .await
            .map_err(|e| DashboardError::Upstream(e.to_string()))?;
        Ok(match parsed {
            DetailsResponse::Wrapped { failures } => failures,
            DetailsResponse::Bare(failures) => failures,
        })
    }
}
