//! Load generator for the aggregator: produces a stream of events where a
//! configurable fraction are verbatim duplicates of earlier uniques, and
//! publishes them in batches with bounded retries.

use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(about = "Send duplicate-laden event traffic to the aggregator")]
struct Cli {
    /// Publish endpoint of the aggregator
    #[arg(long, default_value = "http://127.0.0.1:3000/publish")]
    url: String,

    /// Total number of events to send, duplicates included
    #[arg(long, default_value_t = 5000)]
    count: usize,

    /// Fraction of events that duplicate an earlier unique one (0.0 to 1.0)
    #[arg(long, default_value_t = 0.2)]
    dup_ratio: f64,

    /// Number of events per publish call
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Attempts per batch before giving up on it
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// First retry backoff; doubles on every further attempt
    #[arg(long, default_value_t = 250)]
    retry_base_ms: u64,

    /// Pause between batches, success or not
    #[arg(long, default_value_t = 500)]
    batch_pause_ms: u64,

    /// RNG seed; the generated key sequence is a pure function of it
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
struct Event {
    topic: String,
    event_id: String,
    timestamp: String,
    source: String,
    payload: Map<String, Value>,
}

#[derive(Error, Debug)]
enum PublishError {
    #[error("the aggregator rejected the batch with status {0}")]
    Rejected(reqwest::StatusCode),
    #[error("transport failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        source: reqwest::Error,
    },
}

/// Build the full traffic to send: uniques spread over ten topics, then
/// verbatim clones of randomly chosen uniques up to `count`, shuffled
/// together. Keys and payloads are a pure function of the RNG, so a seeded
/// run is reproducible.
fn generate_events(count: usize, dup_ratio: f64, rng: &mut StdRng) -> Vec<Event> {
    let mut unique_count = (count as f64 * (1.0 - dup_ratio)) as usize;
    if count > 0 && unique_count == 0 {
        unique_count = 1;
    }

    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC 3339 formatting of the current time");

    let mut events: Vec<Event> = (0..unique_count)
        .map(|i| {
            let mut payload = Map::new();
            payload.insert("value".to_string(), json!(rng.gen_range(1..=100)));
            payload.insert("sequence".to_string(), json!(i));
            Event {
                topic: format!("topic_{}", i % 10),
                event_id: Uuid::from_u128(rng.gen()).to_string(),
                timestamp: timestamp.clone(),
                source: "publisher".to_string(),
                payload,
            }
        })
        .collect();

    for _ in unique_count..count {
        let pick = rng.gen_range(0..unique_count);
        events.push(events[pick].clone());
    }

    events.shuffle(rng);
    events
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt - 1)
}

/// Send one batch. Connection-level failures are retried with exponential
/// backoff up to `max_retries`; a response outside the success range will
/// not get better on retry, so the batch is abandoned at once. Batches are
/// atomic for retry purposes, there is no partial resend.
async fn send_batch(
    client: &reqwest::Client,
    url: &str,
    batch: &[Event],
    max_retries: u32,
    base: Duration,
) -> Result<(), PublishError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.post(url).json(&batch).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => return Err(PublishError::Rejected(response.status())),
            Err(err) if attempt < max_retries => {
                let delay = backoff_delay(base, attempt);
                warn!(
                    "attempt {}/{} failed, retrying in {:?}: {}",
                    attempt, max_retries, delay, err
                );
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                return Err(PublishError::RetriesExhausted {
                    attempts: attempt,
                    source,
                })
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut rng = StdRng::seed_from_u64(cli.seed);

    let events = generate_events(cli.count, cli.dup_ratio, &mut rng);
    info!(
        "generated {} events (dup ratio {}), sending to {} in batches of {}",
        events.len(),
        cli.dup_ratio,
        cli.url,
        cli.batch_size
    );

    // The only timeout anywhere in the pipeline is on this outbound call
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client");

    let retry_base = Duration::from_millis(cli.retry_base_ms);
    let mut sent = 0usize;
    let mut failed_batches = 0usize;

    for (index, batch) in events.chunks(cli.batch_size.max(1)).enumerate() {
        match send_batch(&client, &cli.url, batch, cli.max_retries, retry_base).await {
            Ok(()) => {
                sent += batch.len();
                info!("batch {} accepted, {} events sent so far", index + 1, sent);
            }
            Err(err) => {
                failed_batches += 1;
                error!("batch {} permanently failed: {}", index + 1, err);
            }
        }

        tokio::time::sleep(Duration::from_millis(cli.batch_pause_ms)).await;
    }

    info!(
        "finished: {} events sent, {} batches permanently failed",
        sent, failed_batches
    );
}
