use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_include;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use aggregator::api::{PublishResponse, StatsResponse};
use aggregator::config::Config;
use aggregator::event::Event;
use aggregator::server::serve;
use aggregator::store::DedupStore;

pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
    client: reqwest::Client,
}

impl ServerHandle {
    pub async fn start(database_path: &Path) -> ServerHandle {
        let config = Config {
            address: "127.0.0.1:0".parse().unwrap(),
            database_path: database_path.to_string_lossy().into_owned(),
            export_prometheus: false,
            consumer_report_interval_secs: 1,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let join = tokio::spawn(serve(config, listener, async move {
            signal.notified().await;
        }));

        ServerHandle {
            addr,
            shutdown,
            join,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn publish(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url("/publish"))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn publish_raw(&self, body: &'static str) -> reqwest::Response {
        self.client
            .post(self.url("/publish"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn stats(&self) -> StatsResponse {
        self.client
            .get(self.url("/stats"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    pub async fn events(&self, topic: Option<&str>) -> Vec<Event> {
        let mut request = self.client.get(self.url("/events"));
        if let Some(topic) = topic {
            request = request.query(&[("topic", topic)]);
        }
        request.send().await.unwrap().json().await.unwrap()
    }

    pub async fn events_json(&self, topic: Option<&str>) -> Value {
        let mut request = self.client.get(self.url("/events"));
        if let Some(topic) = topic {
            request = request.query(&[("topic", topic)]);
        }
        request.send().await.unwrap().json().await.unwrap()
    }

    /// Publishing only enqueues, so tests poll until everything accepted so
    /// far has been classified one way or the other.
    pub async fn wait_for_drain(&self, expected_received: u64) -> StatsResponse {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let stats = self.stats().await;
            if stats.received == expected_received
                && stats.unique_processed + stats.duplicate_dropped == stats.received
            {
                return stats;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("queue did not drain, stats: {:?}", stats);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn stop(self) {
        self.shutdown.notify_one();
        self.join.await.unwrap();
    }
}

fn sample_event(topic: &str, id: &str) -> Value {
    json!({
        "topic": topic,
        "event_id": id,
        "timestamp": "2025-10-24T00:00:00Z",
        "source": "test",
        "payload": {"value": 1}
    })
}

#[tokio::test]
async fn resent_event_is_accepted_but_stored_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let server = ServerHandle::start(&dir.path().join("dedup.db")).await;

    let event = sample_event("orders", "e-1");
    let response = server.publish(&event).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<PublishResponse>().await.unwrap(),
        PublishResponse { accepted: 1 }
    );
    server.wait_for_drain(1).await;

    // Same event again: intake accepts it, the store does not grow
    let response = server.publish(&event).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<PublishResponse>().await.unwrap(),
        PublishResponse { accepted: 1 }
    );

    let stats = server.wait_for_drain(2).await;
    assert_eq!(stats.unique_processed, 1);
    assert_eq!(stats.duplicate_dropped, 1);

    assert_json_include!(
        actual: server.events_json(Some("orders")).await,
        expected: json!([{
            "topic": "orders",
            "event_id": "e-1",
            "timestamp": "2025-10-24T00:00:00Z",
            "source": "test",
            "payload": {"value": 1}
        }])
    );
    assert_eq!(server.events(Some("orders")).await.len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn batch_with_cycling_ids_dedups_to_distinct_keys() {
    let dir = tempfile::TempDir::new().unwrap();
    let server = ServerHandle::start(&dir.path().join("dedup.db")).await;

    let batch: Vec<Value> = (0..200)
        .map(|i| sample_event("batch", &format!("id-{}", i % 160)))
        .collect();
    let response = server.publish(&json!(batch)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<PublishResponse>().await.unwrap(),
        PublishResponse { accepted: 200 }
    );

    let stats = server.wait_for_drain(200).await;
    assert_eq!(stats.unique_processed, 160);
    assert_eq!(stats.duplicate_dropped, 40);
    assert_eq!(stats.topics, vec!["batch"]);

    assert_eq!(server.events(Some("batch")).await.len(), 160);

    server.stop().await;
}

#[tokio::test]
async fn malformed_bodies_leave_queue_and_counters_untouched() {
    let dir = tempfile::TempDir::new().unwrap();
    let server = ServerHandle::start(&dir.path().join("dedup.db")).await;

    let response = server.publish_raw("{not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("invalid JSON"));

    let response = server.publish(&json!(42)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stats = server.stats().await;
    assert_eq!(stats.received, 0);
    assert_eq!(stats.unique_processed, 0);
    assert_eq!(stats.duplicate_dropped, 0);
    assert!(server.events(None).await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn one_invalid_element_rejects_the_whole_batch() {
    let dir = tempfile::TempDir::new().unwrap();
    let server = ServerHandle::start(&dir.path().join("dedup.db")).await;

    let response = server
        .publish(&json!([
            sample_event("t", "good"),
            {"event_id": "missing-topic", "timestamp": "now", "payload": {}},
        ]))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.text().await.unwrap().contains("topic"));

    // Nothing from the batch was enqueued, not even the valid element
    let stats = server.stats().await;
    assert_eq!(stats.received, 0);
    assert!(server.events(None).await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn empty_batch_is_accepted_with_zero_events() {
    let dir = tempfile::TempDir::new().unwrap();
    let server = ServerHandle::start(&dir.path().join("dedup.db")).await;

    let response = server.publish(&json!([])).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<PublishResponse>().await.unwrap(),
        PublishResponse { accepted: 0 }
    );

    server.stop().await;
}

#[tokio::test]
async fn event_ids_dedup_within_their_topic_only() {
    let dir = tempfile::TempDir::new().unwrap();
    let server = ServerHandle::start(&dir.path().join("dedup.db")).await;

    server
        .publish(&json!([
            sample_event("alpha", "shared"),
            sample_event("beta", "shared"),
        ]))
        .await;

    let stats = server.wait_for_drain(2).await;
    assert_eq!(stats.unique_processed, 2);
    assert_eq!(stats.duplicate_dropped, 0);
    assert_eq!(stats.topics, vec!["alpha", "beta"]);

    assert_eq!(server.events(Some("alpha")).await.len(), 1);
    assert_eq!(server.events(Some("beta")).await.len(), 1);
    assert_eq!(server.events(None).await.len(), 2);

    server.stop().await;
}

#[tokio::test]
async fn dedup_state_survives_a_restart_but_counters_do_not() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("dedup.db");

    let server = ServerHandle::start(&path).await;
    server.publish(&sample_event("t", "e-1")).await;
    let stats = server.wait_for_drain(1).await;
    assert_eq!(stats.unique_processed, 1);
    server.stop().await;

    // Fresh process, same database: the key is still known, counters are not
    let server = ServerHandle::start(&path).await;
    server.publish(&sample_event("t", "e-1")).await;
    let stats = server.wait_for_drain(1).await;
    assert_eq!(stats.unique_processed, 0);
    assert_eq!(stats.duplicate_dropped, 1);
    assert_eq!(server.events(Some("t")).await.len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn graceful_shutdown_drains_accepted_events_into_the_store() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("dedup.db");

    let server = ServerHandle::start(&path).await;
    let batch: Vec<Value> = (0..50)
        .map(|i| sample_event("shutdown", &format!("id-{}", i)))
        .collect();
    let response = server.publish(&json!(batch)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Stop right away: accepted events must still be persisted on the way out
    server.stop().await;

    let store = DedupStore::open(&path).await.unwrap();
    assert_eq!(store.list_events(Some("shutdown")).await.unwrap().len(), 50);
    store.close().await;
}

#[tokio::test]
async fn liveness_reports_healthy_once_the_consumer_runs() {
    let dir = tempfile::TempDir::new().unwrap();
    let server = ServerHandle::start(&dir.path().join("dedup.db")).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let response = server
            .client
            .get(server.url("/_liveness"))
            .send()
            .await
            .unwrap();
        if response.status() == StatusCode::OK {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("liveness probe never turned healthy");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    server.stop().await;
}
