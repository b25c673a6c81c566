use chrono::FixedOffset;
use url::Url;

use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub razorpay: Razorpay,
    pub payments: Payments,
    pub events: Events,
    pub sweeper: Sweeper,
    pub stage: Stage,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    /// MiB
    pub body_limit: u64,
    /// seconds
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_secs: u64,
    /// Upper bound on row and advisory lock waits inside a transaction.
    pub lock_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Razorpay {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Payments {
    pub order_ttl_minutes: i64,
    pub display_offset: FixedOffset,
}

#[derive(Debug, Clone)]
pub struct Events {
    pub webhook_url: Option<Url>,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct Sweeper {
    pub interval_secs: u64,
}
