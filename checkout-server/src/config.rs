//! Server configuration

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Fast-store connection URL (the compatibility-sensitive setting)
    pub redis_url: String,
    /// HTTP port
    pub http_port: u16,
    /// Hold time-to-live in seconds
    pub hold_ttl_secs: i64,
    /// Reaper cadence in seconds
    pub reaper_interval_secs: u64,
    /// Maximum expired candidates fetched per reaper invocation
    pub reaper_batch_size: usize,
    /// Wall-clock budget for one reaper invocation, in seconds
    pub reaper_max_runtime_secs: u64,
    /// Environment: development | staging | production
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: std::env::var("REDIS_URL").expect("REDIS_URL must be set"),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            hold_ttl_secs: std::env::var("HOLD_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            reaper_interval_secs: std::env::var("REAPER_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            reaper_batch_size: std::env::var("REAPER_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            reaper_max_runtime_secs: std::env::var("REAPER_MAX_RUNTIME_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(55),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }
}
