use envconfig::Envconfig;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use aggregator::config::Config;
use aggregator::server::serve;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .expect("could not bind port");

    serve(config, listener, shutdown()).await;
}
