use std::sync::Arc;
use std::time::Duration;

use health::HealthHandle;
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::counters::PipelineCounters;
use crate::event::Event;
use crate::prometheus::report_dropped_events;
use crate::store::DedupStore;

/// The single writer to the dedup store.
///
/// Runs from startup until the intake side of the queue is gone, then
/// drains whatever was already accepted and stops: Running, Draining,
/// Stopped, nothing else. A fresh process start is the only restart.
///
/// A store failure while recording is the one place an accepted event is
/// dropped: it is logged and counted in the drop metric, but lands in
/// neither `unique_processed` nor `duplicate_dropped`, leaving a visible
/// gap under `received` in the stats.
pub struct Consumer {
    store: DedupStore,
    counters: Arc<PipelineCounters>,
    liveness: HealthHandle,
    report_interval: Duration,
}

impl Consumer {
    pub fn new(
        store: DedupStore,
        counters: Arc<PipelineCounters>,
        liveness: HealthHandle,
        report_interval: Duration,
    ) -> Self {
        Self {
            store,
            counters,
            liveness,
            report_interval,
        }
    }

    /// Drain the queue until intake closes, then finish the remainder and
    /// return. One bad event never stops the loop.
    pub async fn run(self, mut queue: mpsc::UnboundedReceiver<Event>) {
        let mut report = tokio::time::interval(self.report_interval);

        loop {
            tokio::select! {
                received = queue.recv() => match received {
                    Some(event) => self.process(event).await,
                    None => break,
                },
                _ = report.tick() => self.liveness.report_healthy(),
            }
        }

        info!("intake closed and queue drained, consumer stopping");
    }

    async fn process(&self, event: Event) {
        match self.store.record_event(&event).await {
            Ok(true) => {
                self.counters.incr_unique_processed();
                counter!("aggregator_events_unique_total").increment(1);
                debug!(topic = %event.topic, event_id = %event.event_id, "recorded new event");
            }
            Ok(false) => {
                self.counters.incr_duplicate_dropped();
                counter!("aggregator_events_duplicate_total").increment(1);
                info!(topic = %event.topic, event_id = %event.event_id, "duplicate dropped");
            }
            Err(err) => {
                report_dropped_events("store_error", 1);
                error!(
                    topic = %event.topic,
                    event_id = %event.event_id,
                    "failed to record event, dropping it: {}", err
                );
            }
        }
    }
}
