//! Display projections of store entities. Projection never fails: missing
//! references render as placeholders.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::composer;
use crate::model::{Action, TestCase, User};
use crate::status::TestStatus;
use crate::store::EntityStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCaseCard {
    pub id: u64,
    pub title: String,
    pub user_id: u64,
    pub user_label: String,
    pub status: TestStatus,
    /// CSS class for the status badge; empty while pending or running.
    pub badge: &'static str,
    pub action_labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub gif_path: Option<String>,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestCaseDetail {
    #[serde(flatten)]
    pub card: TestCaseCard,
    /// Pretty-printed when it parses, verbatim otherwise.
    pub prompt_steps: String,
    pub step_summaries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub id: u64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRow {
    pub id: u64,
    pub prompt: String,
    pub step_count: Option<usize>,
}

pub fn badge(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Success => "badge-success",
        TestStatus::Failed => "badge-failure",
        TestStatus::Pending | TestStatus::Running => "",
    }
}

pub fn display_title(test_case: &TestCase) -> String {
    if test_case.title.trim().is_empty() {
        format!("Test Case #{}", test_case.id)
    } else {
        test_case.title.clone()
    }
}

pub fn test_case_card(store: &EntityStore, test_case: &TestCase) -> TestCaseCard {
    let user_label = match store.user(test_case.user_id) {
        Some(user) => user.name.clone(),
        None => format!("(deleted user #{})", test_case.user_id),
    };
    let action_labels = test_case
        .actions
        .iter()
        .map(|id| match store.action(*id) {
            Some(action) => action.prompt.clone(),
            None => format!("(deleted action #{})", id),
        })
        .collect();

    TestCaseCard {
        id: test_case.id,
        title: display_title(test_case),
        user_id: test_case.user_id,
        user_label,
        status: test_case.status,
        badge: badge(test_case.status),
        action_labels,
        created_at: test_case.created_at,
        gif_path: test_case.gif_path.clone(),
        pdf_url: test_case.pdf_url.clone(),
    }
}

pub fn test_case_cards(store: &EntityStore) -> Vec<TestCaseCard> {
    store
        .test_cases()
        .iter()
        .map(|tc| test_case_card(store, tc))
        .collect()
}

pub fn test_case_detail(store: &EntityStore, test_case: &TestCase) -> TestCaseDetail {
    let parsed = serde_json::from_str::<serde_json::Value>(&test_case.prompt_steps).ok();
    let prompt_steps = parsed
        .as_ref()
        .and_then(|v| serde_json::to_string_pretty(v).ok())
        .unwrap_or_else(|| test_case.prompt_steps.clone());
    let step_summaries = match parsed.as_ref().and_then(|v| v.get("steps")) {
        Some(serde_json::Value::Array(steps)) => steps.iter().map(composer::step_summary).collect(),
        _ => Vec::new(),
    };

    TestCaseDetail {
        card: test_case_card(store, test_case),
        prompt_steps,
        step_summaries,
    }
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        UserRow {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

impl From<&Action> for ActionRow {
    fn from(action: &Action) -> Self {
        ActionRow {
            id: action.id,
            prompt: action.prompt.clone(),
            step_count: composer::action_steps(action).map(|steps| steps.len()),
        }
    }
}

pub fn user_rows(store: &EntityStore) -> Vec<UserRow> {
    store.users().iter().map(UserRow::from).collect()
}

pub fn action_rows(store: &EntityStore) -> Vec<ActionRow> {
    store.actions().iter().map(ActionRow::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryKv, Persistence};

    fn seeded() -> EntityStore {
        EntityStore::open(Persistence::new(MemoryKv::new())).unwrap()
    }

    #[test]
    fn test_badges() {
        assert_eq!(badge(TestStatus::Success), "badge-success");
        assert_eq!(badge(TestStatus::Failed), "badge-failure");
        assert_eq!(badge(TestStatus::Pending), "");
        assert_eq!(badge(TestStatus::Running), "");
    }

    #[test]
    fn test_card_resolves_names() {
        let store = seeded();
        let card = test_case_card(&store, store.test_case(1).unwrap());
        assert_eq!(card.user_label, "John Doe");
        assert_eq!(card.action_labels, vec!["User login", "Navigate to dashboard"]);
    }

    #[test]
    fn test_dangling_references_render_placeholders() {
        let mut store = seeded();
        store.delete_action(2).unwrap();
        store.delete_user(1).unwrap();
        let card = test_case_card(&store, store.test_case(1).unwrap());
        assert_eq!(card.user_label, "(deleted user #1)");
        assert_eq!(card.action_labels[1], "(deleted action #2)");
    }

    #[test]
    fn test_untitled_falls_back_to_id() {
        let store = seeded();
        let mut tc = store.test_case(2).unwrap().clone();
        tc.title = String::new();
        assert_eq!(display_title(&tc), "Test Case #2");
    }

    #[test]
    fn test_detail_keeps_unparsable_steps_verbatim() {
        let store = seeded();
        let mut tc = store.test_case(1).unwrap().clone();
        tc.prompt_steps = "{ broken".to_string();
        let detail = test_case_detail(&store, &tc);
        assert_eq!(detail.prompt_steps, "{ broken");
        assert!(detail.step_summaries.is_empty());
    }

    #[test]
    fn test_action_row_step_count() {
        let ok = Action {
            id: 1,
            prompt: "p".to_string(),
            steps: r#"{"steps":[{"action":"click"},{"action":"wait"}]}"#.to_string(),
        };
        let bad = Action {
            id: 2,
            prompt: "q".to_string(),
            steps: "nope".to_string(),
        };
        assert_eq!(ActionRow::from(&ok).step_count, Some(2));
        assert_eq!(ActionRow::from(&bad).step_count, None);
    }

    #[test]
    fn test_user_row_omits_password() {
        let store = seeded();
        let rows = user_rows(&store);
        let json = serde_json::to_string(&rows).unwrap();
        assert!(!json.contains("password"));
    }
}
