use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::config::{ACTIVITY_BUFFER_SIZE, ACTIVITY_CHANNEL_CAPACITY};

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub source: ActivitySource,
    pub level: ActivityLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    Dashboard,
    Execution,
    Sweep,
    Agent,
}

/// Ordered by severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warn,
    Error,
}

/// Which entries a history query or stream subscriber wants. Empty matches
/// everything.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ActivityFilter {
    pub source: Option<ActivitySource>,
    /// Minimum severity.
    pub level: Option<ActivityLevel>,
}

impl ActivityFilter {
    pub fn matches(&self, entry: &ActivityEntry) -> bool {
        self.source.map_or(true, |s| s == entry.source)
            && self.level.map_or(true, |l| entry.level >= l)
    }
}

/// Recent dashboard events: a bounded history plus a live feed.
pub struct ActivityLog {
    buffer: Arc<RwLock<VecDeque<ActivityEntry>>>,
    sender: broadcast::Sender<ActivityEntry>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(ACTIVITY_CHANNEL_CAPACITY);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(ACTIVITY_BUFFER_SIZE))),
            sender,
        }
    }

    pub async fn push(&self, entry: ActivityEntry) {
        let mut buf = self.buffer.write().await;
        if buf.len() >= ACTIVITY_BUFFER_SIZE {
            buf.pop_front();
        }
        buf.push_back(entry.clone());
        drop(buf);

        let _ = self.sender.send(entry);
    }

    pub async fn history(&self) -> Vec<ActivityEntry> {
        self.buffer.read().await.iter().cloned().collect()
    }

    /// Matching entries newest first, capped at `limit`, plus how many
    /// matched in total.
    pub async fn recent(&self, filter: &ActivityFilter, limit: usize) -> (Vec<ActivityEntry>, usize) {
        let buf = self.buffer.read().await;
        let matching = buf.iter().rev().filter(|e| filter.matches(e));
        let total = matching.clone().count();
        (matching.take(limit).cloned().collect(), total)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEntry> {
        self.sender.subscribe()
    }

    pub async fn emit(
        &self,
        source: ActivitySource,
        level: ActivityLevel,
        message: impl Into<String>,
    ) {
        let entry = ActivityEntry {
            timestamp: Utc::now(),
            source,
            level,
            message: message.into(),
        };
        self.push(entry).await;
    }
}
