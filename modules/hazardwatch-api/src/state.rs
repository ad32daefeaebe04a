use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use hazardwatch_common::Config;
use hazardwatch_pipeline::{Pipeline, WorkerPool};
use tokio::sync::Mutex;

pub struct AppState {
    pub pipeline: Pipeline,
    pub worker_pool: WorkerPool,
    pub config: Config,
    pub rate_limiter: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

pub const SUBMISSIONS_PER_HOUR: usize = 60;

/// Prunes expired entries and records the new request if the IP is still
/// under the hourly cap.
pub fn check_rate_limit(entries: &mut Vec<Instant>, now: Instant, max_per_hour: usize) -> bool {
    let cutoff = now - std::time::Duration::from_secs(3600);
    entries.retain(|t| *t > cutoff);
    if entries.len() >= max_per_hour {
        return false;
    }
    entries.push(now);
    true
}
