use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use metrics::counter;
use tracing::{debug, instrument};

use crate::api::{ApiError, PublishResponse};
use crate::event::parse_publish_body;
use crate::router;

/// Accept one event or an ordered batch of them.
///
/// The whole body is validated before anything is enqueued, so a single bad
/// element rejects the call with nothing accepted. On success every event
/// is enqueued in input order and the call returns at once with the count;
/// persistence happens downstream, never on this path.
#[instrument(skip_all, fields(batch_size))]
pub async fn publish(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<PublishResponse>, ApiError> {
    let events = parse_publish_body(&body)?;

    tracing::Span::current().record("batch_size", events.len());
    debug!("decoded publish request");

    let accepted = events.len();
    for event in events {
        state.queue.put(event)?;
    }

    state.counters.add_received(accepted as u64);
    counter!("aggregator_events_received_total").increment(accepted as u64);

    Ok(Json(PublishResponse { accepted }))
}

pub async fn index() -> &'static str {
    "aggregator"
}
