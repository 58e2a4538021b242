//! Builds a test case's automation script from selected actions and a
//! free-form prompt.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::DashboardError;
use crate::model::Action;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("Provide at least a prompt or an action")]
    Empty,

    #[error("Prompt is not valid JSON: {0}")]
    InvalidPrompt(String),

    #[error("Plain-text prompts can be previewed but not saved; provide a JSON steps document")]
    PlainTextPrompt,
}

impl From<ComposeError> for DashboardError {
    fn from(e: ComposeError) -> Self {
        DashboardError::Validation(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub steps: Vec<Value>,
    /// Selected actions that contributed nothing (missing or malformed).
    pub skipped_actions: Vec<u64>,
}

impl Composition {
    pub fn document(&self) -> Value {
        serde_json::json!({ "steps": self.steps })
    }

    /// The persisted form: `{ "steps": [...] }`, pretty-printed.
    pub fn to_json(&self) -> String {
        let doc = self.document();
        serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string())
    }
}

/// What the author sees before saving.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preview {
    Script {
        script: Value,
        step_count: usize,
        skipped_actions: Vec<u64>,
    },
    Text {
        text: String,
        step_count: usize,
        skipped_actions: Vec<u64>,
    },
}

enum PromptKind {
    Empty,
    Steps(Vec<Value>),
    PlainText(String),
}

fn classify_prompt(prompt: &str) -> Result<PromptKind, ComposeError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Ok(PromptKind::Empty);
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => Ok(PromptKind::Steps(items)),
        Ok(Value::Object(map)) => match map.get("steps") {
            Some(Value::Array(items)) => Ok(PromptKind::Steps(items.clone())),
            Some(_) => Err(ComposeError::InvalidPrompt(
                "`steps` must be an array".to_string(),
            )),
            None => Ok(PromptKind::Steps(vec![Value::Object(map)])),
        },
        Ok(other) => Ok(PromptKind::Steps(vec![other])),
        // Looks like it was meant to be structured.
        Err(e) if trimmed.starts_with('{') || trimmed.starts_with('[') => {
            Err(ComposeError::InvalidPrompt(e.to_string()))
        }
        Err(_) => Ok(PromptKind::PlainText(trimmed.to_string())),
    }
}

/// Steps an action contributes, or `None` when its stored JSON is unusable.
pub fn action_steps(action: &Action) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(&action.steps) {
        Ok(Value::Array(items)) => Some(items),
        Ok(Value::Object(map)) => match map.get("steps") {
            Some(Value::Array(items)) => Some(items.clone()),
            Some(_) => None,
            None => Some(vec![Value::Object(map)]),
        },
        Ok(_) | Err(_) => None,
    }
}

fn collect_action_steps(selected: &[u64], actions: &[Action]) -> (Vec<Value>, Vec<u64>) {
    let mut steps = Vec::new();
    let mut skipped = Vec::new();
    for id in selected {
        let Some(action) = actions.iter().find(|a| a.id == *id) else {
            warn!("Action #{} selected but no longer exists, skipping", id);
            skipped.push(*id);
            continue;
        };
        match action_steps(action) {
            Some(items) => steps.extend(items),
            None => {
                warn!("Action #{} has malformed steps JSON, skipping", id);
                skipped.push(*id);
            }
        }
    }
    (steps, skipped)
}

/// Compose the persisted script: action steps in selection order, then any
/// structured prompt steps.
pub fn compose(
    selected: &[u64],
    actions: &[Action],
    prompt: &str,
) -> Result<Composition, ComposeError> {
    let prompt = classify_prompt(prompt)?;
    let (mut steps, skipped_actions) = collect_action_steps(selected, actions);

    match prompt {
        PromptKind::PlainText(_) => return Err(ComposeError::PlainTextPrompt),
        PromptKind::Steps(extra) => steps.extend(extra),
        PromptKind::Empty => {}
    }

    if steps.is_empty() {
        return Err(ComposeError::Empty);
    }

    Ok(Composition {
        steps,
        skipped_actions,
    })
}

/// Like [`compose`], but a plain-text prompt becomes a readable preface
/// followed by the action step summaries instead of an error.
pub fn preview(selected: &[u64], actions: &[Action], prompt: &str) -> Result<Preview, ComposeError> {
    let prompt = classify_prompt(prompt)?;
    let (mut steps, skipped_actions) = collect_action_steps(selected, actions);

    match prompt {
        PromptKind::PlainText(text) => {
            let mut out = text;
            if !steps.is_empty() {
                out.push_str("\n\nSteps:");
                for (i, step) in steps.iter().enumerate() {
                    out.push_str(&format!("\n{}. {}", i + 1, step_summary(step)));
                }
            }
            Ok(Preview::Text {
                text: out,
                step_count: steps.len(),
                skipped_actions,
            })
        }
        PromptKind::Steps(extra) => {
            steps.extend(extra);
            let composition = Composition {
                steps,
                skipped_actions,
            };
            Ok(Preview::Script {
                script: composition.document(),
                step_count: composition.steps.len(),
                skipped_actions: composition.skipped_actions,
            })
        }
        PromptKind::Empty if steps.is_empty() => Err(ComposeError::Empty),
        PromptKind::Empty => {
            let step_count = steps.len();
            Ok(Preview::Script {
                script: serde_json::json!({ "steps": steps }),
                step_count,
                skipped_actions,
            })
        }
    }
}

/// One-line description of a step, e.g. `click #login-button`.
pub fn step_summary(step: &Value) -> String {
    let Some(map) = step.as_object() else {
        return step.to_string();
    };
    let Some(action) = map.get("action").and_then(Value::as_str) else {
        return step.to_string();
    };
    let detail = ["selector", "url", "value", "name"]
        .iter()
        .find_map(|key| map.get(*key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    match detail {
        Some(detail) => format!("{} {}", action, detail),
        None => action.to_string(),
    }
}

/// Reject text that is not syntactically valid JSON.
pub fn ensure_json(label: &str, text: &str) -> Result<(), DashboardError> {
    serde_json::from_str::<Value>(text)
        .map(|_| ())
        .map_err(|e| DashboardError::validation(format!("Invalid JSON in {}: {}", label, e)))
}
