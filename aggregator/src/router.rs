use std::future::ready;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use health::HealthRegistry;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::counters::PipelineCounters;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::queue::EventQueue;
use crate::store::DedupStore;
use crate::{intake, query};

#[derive(Clone)]
pub struct State {
    pub queue: EventQueue,
    pub store: DedupStore,
    pub counters: Arc<PipelineCounters>,
    pub started_at: Instant,
}

pub fn router(
    liveness: HealthRegistry,
    queue: EventQueue,
    store: DedupStore,
    counters: Arc<PipelineCounters>,
    metrics: bool,
) -> Router {
    let state = State {
        queue,
        store,
        counters,
        started_at: Instant::now(),
    };

    let router = Router::new()
        .route("/", get(intake::index))
        .route("/publish", post(intake::publish))
        .route("/events", get(query::list_events))
        .route("/stats", get(query::stats))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when the crate is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
