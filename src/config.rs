use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub chain_indexer_url: String,
    /// "gas_paid" or "gasless"
    pub swap_provider: String,
    pub swap_provider_url: String,
    pub swap_provider_api_key: Option<String>,
    /// Blocks required before an on-chain event is treated as final
    pub confirmation_depth: i64,
    /// Scan window for a deposit session, minutes
    pub deposit_session_ttl_minutes: i64,
    /// Fixed interval between confirmation polls, seconds
    pub confirmation_poll_seconds: u64,
    /// Concurrency limit for RPC-heavy job kinds
    pub heavy_job_concurrency: usize,
    /// Concurrency limit for light job kinds
    pub light_job_concurrency: usize,
    /// How often workers poll the queue, milliseconds
    pub queue_poll_interval_ms: u64,
    /// A running job with no heartbeat for this long is considered stalled
    pub job_stall_seconds: i64,
    /// Grace period for in-flight jobs on shutdown, seconds
    pub shutdown_grace_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/sprout".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            chain_indexer_url: std::env::var("CHAIN_INDEXER_URL")
                .unwrap_or_else(|_| "http://localhost:8545".to_string()),
            swap_provider: std::env::var("SWAP_PROVIDER")
                .unwrap_or_else(|_| "gas_paid".to_string()),
            swap_provider_url: std::env::var("SWAP_PROVIDER_URL")
                .unwrap_or_else(|_| "https://api.swap.example.com".to_string()),
            swap_provider_api_key: std::env::var("SWAP_PROVIDER_API_KEY").ok(),
            confirmation_depth: parse_env("CONFIRMATION_DEPTH", 12),
            deposit_session_ttl_minutes: parse_env("DEPOSIT_SESSION_TTL_MINUTES", 60),
            confirmation_poll_seconds: parse_env("CONFIRMATION_POLL_SECONDS", 15),
            heavy_job_concurrency: parse_env("HEAVY_JOB_CONCURRENCY", 4),
            light_job_concurrency: parse_env("LIGHT_JOB_CONCURRENCY", 16),
            queue_poll_interval_ms: parse_env("QUEUE_POLL_INTERVAL_MS", 500),
            job_stall_seconds: parse_env("JOB_STALL_SECONDS", 120),
            shutdown_grace_seconds: parse_env("SHUTDOWN_GRACE_SECONDS", 20),
        })
    }
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
