use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::config::{KEY_ACTIONS, KEY_CURRENT_USER, KEY_TEST_CASES, KEY_TEST_RUNS, KEY_USERS};
use crate::error::{DashboardError, Result};
use crate::model::{Action, RunResult, TestCase, TestRun, User};
use crate::status::TestStatus;

// ============================================================================
// Key-value backends
// ============================================================================

/// Durable string key-value store. Values are whole serialized collections.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

pub struct SqliteKv {
    conn: Mutex<Connection>,
}

impl SqliteKv {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let kv = Self {
            conn: Mutex::new(conn),
        };
        kv.init_schema()?;
        Ok(kv)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        ",
        )?;
        Ok(())
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key=?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM kv WHERE key=?1", params![key])?;
        Ok(())
    }
}

/// In-memory backend, used by tests and `--data-dir`-less embedding.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Persistence adapter
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub users: Vec<User>,
    pub actions: Vec<Action>,
    pub test_cases: Vec<TestCase>,
    pub test_runs: Vec<TestRun>,
}

pub struct Persistence {
    kv: Box<dyn KvStore>,
    seed: bool,
}

impl Persistence {
    pub fn new(kv: impl KvStore + 'static) -> Self {
        Self {
            kv: Box::new(kv),
            seed: true,
        }
    }

    /// Missing collections load as empty instead of the seed dataset.
    pub fn without_seed(mut self) -> Self {
        self.seed = false;
        self
    }

    pub fn load(&self) -> Collections {
        let seed = self.seed;
        Collections {
            users: self.load_collection(KEY_USERS, || if seed { seed_users() } else { vec![] }),
            actions: self.load_collection(KEY_ACTIONS, || {
                if seed {
                    seed_actions()
                } else {
                    vec![]
                }
            }),
            test_cases: self.load_collection(KEY_TEST_CASES, || {
                if seed {
                    seed_test_cases()
                } else {
                    vec![]
                }
            }),
            test_runs: self.load_collection(KEY_TEST_RUNS, Vec::new),
        }
    }

    fn load_collection<T: DeserializeOwned>(
        &self,
        key: &str,
        fallback: impl FnOnce() -> Vec<T>,
    ) -> Vec<T> {
        match self.kv.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(items) => items,
                Err(e) => {
                    warn!("Stored '{}' is not a valid collection, using defaults: {}", key, e);
                    fallback()
                }
            },
            Ok(None) => fallback(),
            Err(e) => {
                warn!("Failed to read '{}', using defaults: {}", key, e);
                fallback()
            }
        }
    }

    /// Rewrite one collection wholesale.
    pub fn save_collection<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.kv.set(key, &json)
    }

    pub fn save_all(&self, collections: &Collections) -> Result<()> {
        self.save_collection(KEY_USERS, &collections.users)?;
        self.save_collection(KEY_ACTIONS, &collections.actions)?;
        self.save_collection(KEY_TEST_CASES, &collections.test_cases)?;
        self.save_collection(KEY_TEST_RUNS, &collections.test_runs)?;
        Ok(())
    }

    pub fn current_user_id(&self) -> Option<u64> {
        match self.kv.get(KEY_CURRENT_USER) {
            Ok(Some(raw)) => raw.trim().parse().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read session pointer: {}", e);
                None
            }
        }
    }

    pub fn set_current_user_id(&self, id: Option<u64>) -> Result<()> {
        match id {
            Some(id) => self.kv.set(KEY_CURRENT_USER, &id.to_string()),
            None => self.kv.remove(KEY_CURRENT_USER),
        }
    }

    /// Replace every stored collection with the contents of a browser
    /// local-storage export.
    pub fn import_legacy(&self, raw: &str) -> Result<Collections> {
        let collections = parse_legacy_export(raw)?;
        self.save_all(&collections)?;
        info!(
            "Imported {} users, {} actions, {} test cases, {} test runs",
            collections.users.len(),
            collections.actions.len(),
            collections.test_cases.len(),
            collections.test_runs.len()
        );
        Ok(collections)
    }
}

// ============================================================================
// Seed dataset
// ============================================================================

fn pretty(value: serde_json::Value) -> String {
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

pub fn seed_users() -> Vec<User> {
    vec![
        User {
            id: 1,
            name: "John Doe".to_string(),
            email: "john.doe@example.com".to_string(),
            password: "password123".to_string(),
        },
        User {
            id: 2,
            name: "Jane Smith".to_string(),
            email: "jane.smith@example.com".to_string(),
            password: "password456".to_string(),
        },
    ]
}

pub fn seed_actions() -> Vec<Action> {
    vec![
        Action {
            id: 1,
            prompt: "User login".to_string(),
            steps: pretty(serde_json::json!({
                "steps": [
                    { "action": "input", "selector": "#username", "value": "user" },
                    { "action": "input", "selector": "#password", "value": "pass" },
                    { "action": "click", "selector": "#login-button" }
                ]
            })),
        },
        Action {
            id: 2,
            prompt: "Navigate to dashboard".to_string(),
            steps: pretty(serde_json::json!({
                "steps": [ { "action": "navigate", "url": "/dashboard" } ]
            })),
        },
    ]
}

pub fn seed_test_cases() -> Vec<TestCase> {
    let now = Utc::now();
    vec![
        TestCase {
            id: 1,
            title: "Login and check dashboard".to_string(),
            user_id: 1,
            actions: vec![1, 2],
            prompt_steps: pretty(serde_json::json!({
                "steps": [
                    { "action": "login", "data": { "username": "john_doe", "password": "test123" } },
                    { "action": "navigate_dashboard", "data": { "section": "overview" } }
                ]
            })),
            status: TestStatus::Pending,
            gif_path: None,
            pdf_url: None,
            created_at: now,
        },
        TestCase {
            id: 2,
            title: "Create and logout".to_string(),
            user_id: 2,
            actions: vec![1],
            prompt_steps: pretty(serde_json::json!({
                "steps": [
                    { "action": "login", "data": { "username": "jane_smith", "password": "test456" } },
                    { "action": "create_report", "data": { "title": "Monthly Report", "type": "summary" } },
                    { "action": "logout", "data": {} }
                ]
            })),
            status: TestStatus::Pending,
            gif_path: None,
            pdf_url: None,
            created_at: now,
        },
    ]
}

// ============================================================================
// Legacy local-storage export
// ============================================================================

#[derive(Deserialize)]
struct LegacyUser {
    id: Option<u64>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct LegacyAction {
    id: Option<u64>,
    #[serde(default)]
    prompt: String,
    #[serde(default, alias = "stepsJson")]
    steps: String,
}

#[derive(Deserialize)]
struct LegacyTestCase {
    id: Option<u64>,
    #[serde(default)]
    title: String,
    /// Name slug such as `john_doe`.
    user: Option<String>,
    user_id: Option<u64>,
    #[serde(default)]
    actions: Vec<serde_json::Value>,
    #[serde(default, alias = "promptSteps")]
    prompt_steps: String,
    status: Option<String>,
    gif_path: Option<String>,
    pdf_url: Option<String>,
    #[serde(alias = "createdAt")]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct LegacyRunResult {
    #[serde(alias = "testCaseId")]
    test_case_id: u64,
    #[serde(default)]
    status: String,
    #[serde(alias = "gif_path")]
    gif_url: Option<String>,
    pdf_url: Option<String>,
}

#[derive(Deserialize)]
struct LegacyRun {
    id: Option<u64>,
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "totalTests")]
    total_tests: u32,
    #[serde(default)]
    passed: u32,
    #[serde(default)]
    failed: u32,
    #[serde(default)]
    results: Vec<LegacyRunResult>,
}

/// Name slug used by older exports to reference users and actions.
pub fn slug(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}

/// Local-storage values are JSON strings; tolerate already-decoded arrays too.
fn decode_entry<T: DeserializeOwned>(export: &serde_json::Value, key: &str) -> Result<Vec<T>> {
    let value = match export.get(key) {
        Some(v) => v,
        None => return Ok(Vec::new()),
    };
    let items = match value {
        serde_json::Value::String(raw) => serde_json::from_str(raw),
        other => serde_json::from_value(other.clone()),
    };
    items.map_err(|e| DashboardError::validation(format!("Invalid '{}' in export: {}", key, e)))
}

fn assign_ids<T>(items: Vec<T>, id_of: impl Fn(&T) -> Option<u64>) -> Vec<(u64, T)> {
    let mut next = items.iter().filter_map(&id_of).max().unwrap_or(0) + 1;
    items
        .into_iter()
        .map(|item| {
            let id = id_of(&item).unwrap_or_else(|| {
                let id = next;
                next += 1;
                id
            });
            (id, item)
        })
        .collect()
}

fn legacy_status(raw: Option<&str>) -> TestStatus {
    match raw.map(str::trim) {
        None | Some("") | Some("pending") => TestStatus::Pending,
        Some(other) => TestStatus::from_backend(other),
    }
}

pub fn parse_legacy_export(raw: &str) -> Result<Collections> {
    let export: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| DashboardError::validation(format!("Export is not valid JSON: {}", e)))?;
    if !export.is_object() {
        return Err(DashboardError::validation("Export must be a JSON object"));
    }

    let users: Vec<User> = assign_ids(decode_entry::<LegacyUser>(&export, KEY_USERS)?, |u| u.id)
        .into_iter()
        .map(|(id, u)| User {
            id,
            name: u.name,
            email: u.email,
            password: u.password,
        })
        .collect();

    let actions: Vec<Action> =
        assign_ids(decode_entry::<LegacyAction>(&export, KEY_ACTIONS)?, |a| a.id)
            .into_iter()
            .map(|(id, a)| Action {
                id,
                prompt: a.prompt,
                steps: a.steps,
            })
            .collect();

    let now = Utc::now();
    let mut test_cases = Vec::new();
    for (id, tc) in assign_ids(decode_entry::<LegacyTestCase>(&export, KEY_TEST_CASES)?, |t| t.id)
    {
        let user_id = tc.user_id.or_else(|| {
            let wanted = tc.user.as_deref()?;
            users.iter().find(|u| slug(&u.name) == wanted).map(|u| u.id)
        });
        let Some(user_id) = user_id else {
            warn!("Dropping imported test case #{}: unknown user {:?}", id, tc.user);
            continue;
        };

        let mut action_ids = Vec::new();
        for reference in &tc.actions {
            let resolved = match reference {
                serde_json::Value::Number(n) => n.as_u64(),
                serde_json::Value::String(s) => actions
                    .iter()
                    .find(|a| slug(&a.prompt) == *s)
                    .map(|a| a.id)
                    .or_else(|| s.parse().ok()),
                _ => None,
            };
            match resolved {
                Some(action_id) => action_ids.push(action_id),
                None => warn!(
                    "Imported test case #{}: unresolved action reference {}",
                    id, reference
                ),
            }
        }

        test_cases.push(TestCase {
            id,
            title: tc.title,
            user_id,
            actions: action_ids,
            prompt_steps: tc.prompt_steps,
            status: legacy_status(tc.status.as_deref()),
            gif_path: tc.gif_path,
            pdf_url: tc.pdf_url,
            created_at: tc.created_at.unwrap_or(now),
        });
    }

    let mut test_runs: Vec<TestRun> =
        assign_ids(decode_entry::<LegacyRun>(&export, KEY_TEST_RUNS)?, |r| r.id)
            .into_iter()
            .map(|(id, run)| {
                let results: Vec<RunResult> = run
                    .results
                    .into_iter()
                    .map(|r| RunResult {
                        test_case_id: r.test_case_id,
                        status: TestStatus::from_backend(&r.status),
                        gif_url: r.gif_url,
                        pdf_url: r.pdf_url,
                        error: None,
                    })
                    .collect();
                let timestamp = run.timestamp.unwrap_or(now);
                if results.is_empty() {
                    TestRun {
                        id,
                        timestamp,
                        total_tests: run.total_tests.max(run.passed + run.failed),
                        passed: run.passed,
                        failed: run.failed,
                        results,
                    }
                } else {
                    let mut folded = TestRun::from_results(id, timestamp, results);
                    folded.total_tests = folded.total_tests.max(run.total_tests);
                    folded
                }
            })
            .collect();
    // Older exports kept the newest run first; storage is insertion order.
    test_runs.sort_by_key(|r| (r.timestamp, r.id));

    Ok(Collections {
        users,
        actions,
        test_cases,
        test_runs,
    })
}

/// Memory backend with a write budget. `None` means unlimited; once a
/// `Some` budget is spent every write fails.
#[cfg(test)]
pub(crate) type WriteBudget = std::sync::Arc<Mutex<Option<usize>>>;

#[cfg(test)]
pub(crate) struct FailingKv {
    inner: MemoryKv,
    budget: WriteBudget,
}

#[cfg(test)]
impl FailingKv {
    pub(crate) fn new() -> (Self, WriteBudget) {
        let budget = WriteBudget::default();
        let kv = Self {
            inner: MemoryKv::new(),
            budget: budget.clone(),
        };
        (kv, budget)
    }

    fn spend(&self) -> Result<()> {
        match self.budget.lock().unwrap().as_mut() {
            Some(0) => Err(DashboardError::Storage("disk full".to_string())),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
impl KvStore for FailingKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.spend()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.spend()?;
        self.inner.remove(key)
    }
}
