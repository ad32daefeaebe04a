use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_host: String,
    pub http_port: u16,

    /// Number of background workers draining the pipeline queue.
    pub pipeline_workers: usize,
    /// Bounded capacity of the pipeline's report-id queue.
    pub pipeline_queue_capacity: usize,
    /// Per-subscriber bounded queue capacity for the event broadcaster.
    pub broadcast_queue_capacity: usize,
    /// Idle time before a subscriber receives a keepalive frame.
    pub broadcast_keepalive_secs: u64,
    /// Interval between sweeps that re-enqueue unprocessed reports.
    pub retry_sweep_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("HTTP_PORT must be a number"),
            pipeline_workers: env::var("PIPELINE_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            pipeline_queue_capacity: env::var("PIPELINE_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(256),
            broadcast_queue_capacity: env::var("BROADCAST_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(64),
            broadcast_keepalive_secs: env::var("BROADCAST_KEEPALIVE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            retry_sweep_interval_secs: env::var("RETRY_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        }
    }

    /// Load config for the migration binary (database connection only).
    pub fn migrate_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            http_host: String::new(),
            http_port: 0,
            pipeline_workers: 0,
            pipeline_queue_capacity: 0,
            broadcast_queue_capacity: 0,
            broadcast_keepalive_secs: 0,
            retry_sweep_interval_secs: 0,
        }
    }

    /// Log the config with the database URL's credentials redacted.
    pub fn log_redacted(&self) {
        let redacted_db = redact_url_credentials(&self.database_url);
        tracing::info!(
            database_url = %redacted_db,
            http_host = %self.http_host,
            http_port = self.http_port,
            pipeline_workers = self.pipeline_workers,
            "loaded configuration"
        );
    }
}

fn redact_url_credentials(url: &str) -> String {
    match url.find("://").and_then(|scheme_end| {
        let rest = &url[scheme_end + 3..];
        rest.find('@').map(|at| (scheme_end, at))
    }) {
        Some((scheme_end, at)) => format!(
            "{}://***{}",
            &url[..scheme_end],
            &url[scheme_end + 3 + at..]
        ),
        None => url.to_string(),
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
