use std::net::SocketAddr;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    /// Created on first start, reused afterwards. Dedup state lives here,
    /// so wiping the file forgets every key ever seen.
    #[envconfig(default = "data/dedup.db")]
    pub database_path: String,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    /// How often the consumer reports liveness while idle.
    #[envconfig(default = "10")]
    pub consumer_report_interval_secs: u64,
}
