use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::{ApiError, StatsResponse};
use crate::event::Event;
use crate::router;

#[derive(Deserialize, Default)]
pub struct EventsQuery {
    pub topic: Option<String>,
}

/// Stored events in insertion order, optionally filtered to one topic.
pub async fn list_events(
    state: State<router::State>,
    query: Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = state.store.list_events(query.topic.as_deref()).await?;
    Ok(Json(events))
}

/// Counters, known topics and uptime. Counter reads and the topic list are
/// separate lookups, so they can skew slightly against each other; the
/// counts may run ahead of what `list_events` returns at the same instant.
pub async fn stats(state: State<router::State>) -> Result<Json<StatsResponse>, ApiError> {
    let topics = state.store.list_topics().await?;

    Ok(Json(StatsResponse {
        received: state.counters.received(),
        unique_processed: state.counters.unique_processed(),
        duplicate_dropped: state.counters.duplicate_dropped(),
        topics,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}
