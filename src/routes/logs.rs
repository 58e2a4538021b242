//! Activity feed: a filtered history page and a live SSE stream.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::Deserialize;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::activity::{ActivityFilter, ActivityLevel, ActivitySource};
use crate::config::ACTIVITY_BUFFER_SIZE;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub source: Option<ActivitySource>,
    pub level: Option<ActivityLevel>,
}

fn default_limit() -> usize {
    100
}

impl HistoryQuery {
    fn filter(&self) -> ActivityFilter {
        ActivityFilter {
            source: self.source,
            level: self.level,
        }
    }
}

/// GET /logs/history?source=sweep&level=warn returns matching activity,
/// newest first. `total` counts every match, not just the returned page.
pub async fn log_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.min(ACTIVITY_BUFFER_SIZE);
    let (entries, total) = state.activity.recent(&query.filter(), limit).await;

    Json(serde_json::json!({
        "entries": entries,
        "total": total,
        "limit": limit,
        "source": query.source,
        "level": query.level,
    }))
}

/// GET /logs/stream?source=execution is an SSE feed of matching activity.
pub async fn log_stream(
    State(state): State<SharedState>,
    Query(filter): Query<ActivityFilter>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.activity.subscribe();

    let event_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(entry) if filter.matches(&entry) => {
            let data = serde_json::to_string(&entry).unwrap_or_default();
            Some(Ok(Event::default().event("activity").data(data)))
        }
        Ok(_) => None,
        // Lagged receivers skip what they missed
        Err(_) => None,
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
