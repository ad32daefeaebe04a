//! Bounded background worker pool draining the pipeline queue (§4.5).
//!
//! `submit_report` only persists the raw report and enqueues its id; a fixed
//! number of worker tasks pull ids off the channel and run
//! [`Pipeline::process_report`]. This keeps per-report processing off the
//! request path without letting an unbounded number of tasks pile up under load.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<i64>,
}

impl WorkerPool {
    /// Spawns `workers` tasks sharing one bounded queue of capacity `queue_capacity`.
    pub fn spawn(pipeline: Pipeline, workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<i64>(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            let pipeline = pipeline.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let report_id = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(report_id) = report_id else { break };
                    if let Err(err) = pipeline.process_report(report_id).await {
                        warn!(worker_id, report_id, error = %err, "pipeline worker failed to process report");
                    }
                }
            });
        }

        Self { tx }
    }

    /// Enqueues a report id for background processing. Suspends only if the
    /// queue is momentarily full; never waits for processing to complete.
    pub async fn enqueue(&self, report_id: i64) {
        if self.tx.send(report_id).await.is_err() {
            warn!(report_id, "pipeline worker pool channel closed, report will only be recovered by the retry sweep");
        }
    }
}
