use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{error, info, warn};

use crate::composer;
use crate::config::{KEY_ACTIONS, KEY_TEST_CASES, KEY_TEST_RUNS, KEY_USERS};
use crate::error::{DashboardError, Result};
use crate::model::{
    Action, ActionPatch, NewAction, NewTestCase, NewUser, RunResult, RunUpdate, TestCase,
    TestCasePatch, TestRun, User, UserPatch,
};
use crate::persistence::Persistence;
use crate::status::TestStatus;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// In-memory collections, written through to [`Persistence`] after every
/// mutation.
pub struct EntityStore {
    persistence: Persistence,
    users: Vec<User>,
    actions: Vec<Action>,
    test_cases: Vec<TestCase>,
    test_runs: Vec<TestRun>,
}

trait HasId {
    fn id(&self) -> u64;
}

impl HasId for User {
    fn id(&self) -> u64 {
        self.id
    }
}
impl HasId for Action {
    fn id(&self) -> u64 {
        self.id
    }
}
impl HasId for TestCase {
    fn id(&self) -> u64 {
        self.id
    }
}
impl HasId for TestRun {
    fn id(&self) -> u64 {
        self.id
    }
}

fn next_id<T: HasId>(items: &[T]) -> u64 {
    items.iter().map(HasId::id).max().unwrap_or(0) + 1
}

/// Apply `mutate` to a copy of `slot`, persist the copy, then commit it.
/// A failed write leaves `slot` untouched.
fn commit<T, R>(
    persistence: &Persistence,
    key: &str,
    slot: &mut Vec<T>,
    mutate: impl FnOnce(&mut Vec<T>) -> R,
) -> Result<R>
where
    T: Clone + Serialize,
{
    let mut draft = slot.clone();
    let out = mutate(&mut draft);
    persistence.save_collection(key, &draft)?;
    *slot = draft;
    Ok(out)
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DashboardError::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

impl EntityStore {
    /// Load every collection. Test cases left `running` by a previous
    /// process can never complete, so they are marked failed.
    pub fn open(persistence: Persistence) -> Result<Self> {
        let loaded = persistence.load();
        let mut store = Self {
            persistence,
            users: loaded.users,
            actions: loaded.actions,
            test_cases: loaded.test_cases,
            test_runs: loaded.test_runs,
        };

        let stale: Vec<u64> = store
            .test_cases
            .iter()
            .filter(|tc| tc.status == TestStatus::Running)
            .map(|tc| tc.id)
            .collect();
        if !stale.is_empty() {
            warn!("Marking interrupted test cases as failed: {:?}", stale);
            commit(
                &store.persistence,
                KEY_TEST_CASES,
                &mut store.test_cases,
                |cases| {
                    for tc in cases.iter_mut().filter(|tc| tc.status == TestStatus::Running) {
                        tc.status = TestStatus::Failed;
                    }
                },
            )?;
        }

        info!(
            "Entity store loaded: {} users, {} actions, {} test cases, {} test runs",
            store.users.len(),
            store.actions.len(),
            store.test_cases.len(),
            store.test_runs.len()
        );
        Ok(store)
    }

    /// Write every collection; called on shutdown.
    pub fn flush(&self) -> Result<()> {
        self.persistence.save_collection(KEY_USERS, &self.users)?;
        self.persistence.save_collection(KEY_ACTIONS, &self.actions)?;
        self.persistence
            .save_collection(KEY_TEST_CASES, &self.test_cases)?;
        self.persistence.save_collection(KEY_TEST_RUNS, &self.test_runs)?;
        Ok(())
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, id: u64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, id: u64) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    pub fn test_case(&self, id: u64) -> Option<&TestCase> {
        self.test_cases.iter().find(|tc| tc.id == id)
    }

    /// Runs in insertion order (oldest first).
    pub fn test_runs(&self) -> &[TestRun] {
        &self.test_runs
    }

    pub fn test_run(&self, id: u64) -> Option<&TestRun> {
        self.test_runs.iter().find(|r| r.id == id)
    }

    // ========================================================================
    // Users
    // ========================================================================

    fn check_user_fields(&self, id: Option<u64>, name: &str, email: &str, password: &str) -> Result<()> {
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(DashboardError::validation("Please fill in all fields"));
        }
        if !is_valid_email(email) {
            return Err(DashboardError::validation("Please enter a valid email address"));
        }
        if self
            .users
            .iter()
            .any(|u| Some(u.id) != id && u.email == email)
        {
            return Err(DashboardError::validation(
                "A user with this email already exists",
            ));
        }
        Ok(())
    }

    pub fn create_user(&mut self, new: NewUser) -> Result<User> {
        let name = new.name.trim().to_string();
        let email = new.email.trim().to_string();
        let password = new.password.trim().to_string();
        self.check_user_fields(None, &name, &email, &password)?;

        let user = User {
            id: next_id(&self.users),
            name,
            email,
            password,
        };
        let created = user.clone();
        commit(&self.persistence, KEY_USERS, &mut self.users, |users| {
            users.push(user)
        })?;
        info!("Created user #{} ({})", created.id, created.email);
        Ok(created)
    }

    pub fn update_user(&mut self, id: u64, patch: UserPatch) -> Result<Option<User>> {
        let Some(current) = self.user(id).cloned() else {
            warn!("Update ignored: user #{} does not exist", id);
            return Ok(None);
        };
        let name = patch.name.map(|v| v.trim().to_string()).unwrap_or(current.name);
        let email = patch
            .email
            .map(|v| v.trim().to_string())
            .unwrap_or(current.email);
        let password = patch
            .password
            .map(|v| v.trim().to_string())
            .unwrap_or(current.password);
        self.check_user_fields(Some(id), &name, &email, &password)?;

        let updated = User {
            id,
            name,
            email,
            password,
        };
        if self.user(id) == Some(&updated) {
            return Ok(Some(updated));
        }
        let out = updated.clone();
        commit(&self.persistence, KEY_USERS, &mut self.users, |users| {
            if let Some(slot) = users.iter_mut().find(|u| u.id == id) {
                *slot = updated;
            }
        })?;
        Ok(Some(out))
    }

    /// Test cases bound to the user keep their now-dangling `user_id`.
    pub fn delete_user(&mut self, id: u64) -> Result<bool> {
        if self.user(id).is_none() {
            return Ok(false);
        }
        commit(&self.persistence, KEY_USERS, &mut self.users, |users| {
            users.retain(|u| u.id != id)
        })?;
        if self.persistence.current_user_id() == Some(id) {
            self.persistence.set_current_user_id(None)?;
        }
        Ok(true)
    }

    // ========================================================================
    // Actions
    // ========================================================================

    pub fn create_action(&mut self, new: NewAction) -> Result<Action> {
        let prompt = required("Prompt", &new.prompt)?;
        let steps = required("Steps JSON", &new.steps)?;
        composer::ensure_json("steps", &steps)?;

        let action = Action {
            id: next_id(&self.actions),
            prompt,
            steps,
        };
        let created = action.clone();
        commit(&self.persistence, KEY_ACTIONS, &mut self.actions, |actions| {
            actions.push(action)
        })?;
        Ok(created)
    }

    pub fn update_action(&mut self, id: u64, patch: ActionPatch) -> Result<Option<Action>> {
        let Some(current) = self.action(id).cloned() else {
            warn!("Update ignored: action #{} does not exist", id);
            return Ok(None);
        };
        let prompt = match patch.prompt {
            Some(p) => required("Prompt", &p)?,
            None => current.prompt,
        };
        let steps = match patch.steps {
            Some(s) => {
                let s = required("Steps JSON", &s)?;
                composer::ensure_json("steps", &s)?;
                s
            }
            None => current.steps,
        };

        let updated = Action { id, prompt, steps };
        let out = updated.clone();
        commit(&self.persistence, KEY_ACTIONS, &mut self.actions, |actions| {
            if let Some(slot) = actions.iter_mut().find(|a| a.id == id) {
                *slot = updated;
            }
        })?;
        Ok(Some(out))
    }

    /// Test cases referencing the action keep the dangling id.
    pub fn delete_action(&mut self, id: u64) -> Result<bool> {
        if self.action(id).is_none() {
            return Ok(false);
        }
        commit(&self.persistence, KEY_ACTIONS, &mut self.actions, |actions| {
            actions.retain(|a| a.id != id)
        })?;
        Ok(true)
    }

    // ========================================================================
    // Test cases
    // ========================================================================

    pub fn create_test_case(&mut self, new: NewTestCase) -> Result<TestCase> {
        let title = required("Title", &new.title)?;
        if self.user(new.user_id).is_none() {
            return Err(DashboardError::validation(format!(
                "User #{} does not exist",
                new.user_id
            )));
        }
        let composition = composer::compose(&new.actions, &self.actions, &new.prompt)?;

        let test_case = TestCase {
            id: next_id(&self.test_cases),
            title,
            user_id: new.user_id,
            actions: new.actions,
            prompt_steps: composition.to_json(),
            status: TestStatus::Pending,
            gif_path: None,
            pdf_url: None,
            created_at: Utc::now(),
        };
        let created = test_case.clone();
        commit(
            &self.persistence,
            KEY_TEST_CASES,
            &mut self.test_cases,
            |cases| cases.push(test_case),
        )?;
        info!("Created test case #{} '{}'", created.id, created.title);
        Ok(created)
    }

    pub fn update_test_case(&mut self, id: u64, patch: TestCasePatch) -> Result<Option<TestCase>> {
        let Some(mut updated) = self.test_case(id).cloned() else {
            warn!("Update ignored: test case #{} does not exist", id);
            return Ok(None);
        };
        if let Some(title) = patch.title {
            updated.title = required("Title", &title)?;
        }
        if let Some(user_id) = patch.user_id {
            if self.user(user_id).is_none() {
                return Err(DashboardError::validation(format!(
                    "User #{} does not exist",
                    user_id
                )));
            }
            updated.user_id = user_id;
        }
        if let Some(actions) = patch.actions {
            updated.actions = actions;
        }
        if let Some(prompt_steps) = patch.prompt_steps {
            let prompt_steps = required("Prompt steps", &prompt_steps)?;
            composer::ensure_json("prompt steps", &prompt_steps)?;
            updated.prompt_steps = prompt_steps;
        }

        let out = updated.clone();
        commit(
            &self.persistence,
            KEY_TEST_CASES,
            &mut self.test_cases,
            |cases| {
                if let Some(slot) = cases.iter_mut().find(|tc| tc.id == id) {
                    *slot = updated;
                }
            },
        )?;
        Ok(Some(out))
    }

    /// Past test runs keep their result records for the deleted test case.
    pub fn delete_test_case(&mut self, id: u64) -> Result<bool> {
        if self.test_case(id).is_none() {
            return Ok(false);
        }
        commit(
            &self.persistence,
            KEY_TEST_CASES,
            &mut self.test_cases,
            |cases| cases.retain(|tc| tc.id != id),
        )?;
        Ok(true)
    }

    /// Claim a test case for execution. Rejects a second start while the
    /// first is still in flight.
    pub fn mark_running(&mut self, id: u64) -> Result<TestCase> {
        let current = self.test_case(id).ok_or(DashboardError::NotFound {
            kind: "Test case",
            id,
        })?;
        if current.status == TestStatus::Running {
            return Err(DashboardError::AlreadyRunning(format!("Test case #{}", id)));
        }
        let mut claimed = current.clone();
        claimed.status = TestStatus::Running;
        let out = claimed.clone();
        commit(
            &self.persistence,
            KEY_TEST_CASES,
            &mut self.test_cases,
            |cases| {
                if let Some(slot) = cases.iter_mut().find(|tc| tc.id == id) {
                    *slot = claimed;
                }
            },
        )?;
        Ok(out)
    }

    /// Record the outcome of one execution. Returns `None` if the test case
    /// was deleted while it ran.
    ///
    /// Unlike other mutations, the outcome is kept in memory even when the
    /// write fails, so the test case never stays `running`. The next
    /// successful write of the collection or the shutdown flush persists it.
    pub fn apply_run_update(&mut self, id: u64, update: RunUpdate) -> Result<Option<TestCase>> {
        let Some(mut updated) = self.test_case(id).cloned() else {
            warn!("Run finished for test case #{} which no longer exists", id);
            return Ok(None);
        };
        updated.status = update.status;
        updated.gif_path = update.gif_path;
        updated.pdf_url = update.pdf_url;

        let out = updated.clone();
        let terminal = updated.clone();
        let written = commit(
            &self.persistence,
            KEY_TEST_CASES,
            &mut self.test_cases,
            |cases| {
                if let Some(slot) = cases.iter_mut().find(|tc| tc.id == id) {
                    *slot = updated;
                }
            },
        );
        if let Err(e) = written {
            error!(
                "Outcome of test case #{} kept in memory only, write failed: {}",
                id, e
            );
            if let Some(slot) = self.test_cases.iter_mut().find(|tc| tc.id == id) {
                *slot = terminal;
            }
            return Err(e);
        }
        Ok(Some(out))
    }

    // ========================================================================
    // Test runs
    // ========================================================================

    /// Append a run folded from `results`. History is append-only.
    pub fn append_test_run(&mut self, results: Vec<RunResult>) -> Result<TestRun> {
        let run = TestRun::from_results(next_id(&self.test_runs), Utc::now(), results);
        let out = run.clone();
        commit(&self.persistence, KEY_TEST_RUNS, &mut self.test_runs, |runs| {
            runs.push(run)
        })?;
        Ok(out)
    }
}
