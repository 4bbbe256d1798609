use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use health::HealthRegistry;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::consumer::Consumer;
use crate::counters::PipelineCounters;
use crate::queue::EventQueue;
use crate::router;
use crate::store::DedupStore;

/// Run the pipeline until `shutdown` resolves.
///
/// Startup order: store first (a failure aborts before any traffic is
/// accepted), then the consumer, then the listener. Shutdown runs the same
/// order backwards: stop accepting, let the consumer drain everything
/// already enqueued, close the store. A clean shutdown loses nothing.
pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = DedupStore::open(Path::new(&config.database_path))
        .await
        .expect("failed to open dedup store");

    let liveness = HealthRegistry::new("liveness");
    let counters = Arc::new(PipelineCounters::default());
    let (queue, receiver) = EventQueue::new();

    // Three missed reports before the probe calls the consumer stalled
    let consumer_liveness = liveness.register(
        "consumer".to_string(),
        time::Duration::seconds((config.consumer_report_interval_secs * 3) as i64),
    );
    let consumer = Consumer::new(
        store.clone(),
        counters.clone(),
        consumer_liveness,
        Duration::from_secs(config.consumer_report_interval_secs),
    );
    let consumer_handle = tokio::spawn(consumer.run(receiver));

    let app = router::router(
        liveness,
        queue.clone(),
        store.clone(),
        counters,
        config.export_prometheus,
    );

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap();

    // The accept loop is done; dropping the last intake handle closes the
    // queue so the consumer drains what was already accepted, then stops.
    drop(queue);
    if let Err(err) = consumer_handle.await {
        tracing::error!("consumer task failed: {}", err);
    }
    store.close().await;
    tracing::info!("dedup store closed");
}
