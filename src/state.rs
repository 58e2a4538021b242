use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::activity::ActivityLog;
use crate::config::DashboardConfig;
use crate::error::Result;
use crate::execution::ExecutionClient;
use crate::store::EntityStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: DashboardConfig,
    /// Single owner of every entity. Never held across a network call.
    pub store: RwLock<EntityStore>,
    pub client: ExecutionClient,
    pub sweep: RwLock<SweepState>,
    pub activity: ActivityLog,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepState {
    pub running: bool,
    pub current_index: usize,
    pub total: usize,
    pub current_test_case_id: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_run_id: Option<u64>,
}

impl SweepState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AppState {
    pub fn new(config: DashboardConfig, store: EntityStore) -> Result<Self> {
        let client = ExecutionClient::new(config.agent_url.clone(), config.details_url.clone())?;
        Ok(Self {
            config,
            store: RwLock::new(store),
            client,
            sweep: RwLock::new(SweepState::new()),
            activity: ActivityLog::new(),
        })
    }
}
