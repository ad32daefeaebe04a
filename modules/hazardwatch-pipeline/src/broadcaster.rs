//! Real-time fan-out of pipeline activity to SSE subscribers (§4.6).
//!
//! Each subscriber gets its own bounded channel; a slow subscriber is dropped
//! rather than allowed to backpressure the pipeline. The subscriber set is
//! guarded by its own lock, released before any send, so a stuck subscriber
//! can never block store operations (§5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Topics emitted onto the broadcast stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Connected { data: serde_json::Value },
    NewReport { data: serde_json::Value },
    ReportProcessed { data: serde_json::Value },
    HazardUpdated { data: serde_json::Value },
    EmergencyAlert { data: serde_json::Value },
    HazardValidated { data: serde_json::Value },
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    frame: &'a Frame,
    timestamp: chrono::DateTime<Utc>,
}

const DEFAULT_QUEUE_CAPACITY: usize = 64;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Frame>,
}

/// Shared fan-out point. Cheap to clone; all clones share the subscriber set.
#[derive(Clone)]
pub struct Broadcaster {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl Broadcaster {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: if queue_capacity == 0 {
                DEFAULT_QUEUE_CAPACITY
            } else {
                queue_capacity
            },
        }
    }

    /// Registers a new subscriber and returns the receiving half of its queue.
    pub async fn subscribe(&self) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().await.push(Subscriber { id, tx });
        debug!(subscriber_id = id, "subscriber connected");
        rx
    }

    /// Sends a frame to every current subscriber, dropping any whose queue is
    /// full or whose receiver has gone away. Never awaits while the lock is
    /// held — the send itself is try_send, which never blocks.
    pub async fn publish(&self, frame: Frame) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|sub| match sub.tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(subscriber_id = sub.id, "dropping slow subscriber");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        // best-effort; used only for diagnostics, not correctness.
        self.subscribers
            .try_lock()
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Turns a subscriber's receiver into a keepalive-interleaved SSE byte
/// stream. Lives here (rather than in the HTTP crate) because it is the
/// broadcaster's contract: what a subscriber actually receives on the wire.
/// The first frame sent to any subscriber is always `connected` (§6).
pub fn sse_stream(
    mut rx: mpsc::Receiver<Frame>,
    keepalive: Duration,
) -> impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>> {
    async_stream::stream! {
        let connected_frame = Frame::Connected { data: serde_json::json!({}) };
        let connected = Envelope { frame: &connected_frame, timestamp: Utc::now() };
        let json = serde_json::to_string(&connected).unwrap_or_else(|_| "{}".to_string());
        yield Ok(axum::response::sse::Event::default().data(json));

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(frame) => {
                            let envelope = Envelope { frame: &frame, timestamp: Utc::now() };
                            let json = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
                            yield Ok(axum::response::sse::Event::default().data(json));
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(keepalive) => {
                    yield Ok(axum::response::sse::Event::default().comment("keepalive"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_frame() {
        let broadcaster = Broadcaster::new(8);
        let mut rx = broadcaster.subscribe().await;
        broadcaster
            .publish(Frame::NewReport { data: serde_json::json!({"id": 1}) })
            .await;
        let frame = rx.recv().await.expect("frame delivered");
        matches!(frame, Frame::NewReport { .. });
    }

    #[tokio::test]
    async fn full_queue_drops_subscriber_without_blocking_publish() {
        let broadcaster = Broadcaster::new(1);
        let _rx = broadcaster.subscribe().await;
        // first publish fills the one-slot queue, second should drop the subscriber
        broadcaster.publish(Frame::NewReport { data: serde_json::json!({}) }).await;
        broadcaster.publish(Frame::NewReport { data: serde_json::json!({}) }).await;
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_publish() {
        let broadcaster = Broadcaster::new(8);
        let rx = broadcaster.subscribe().await;
        drop(rx);
        broadcaster.publish(Frame::NewReport { data: serde_json::json!({}) }).await;
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn sse_stream_emits_connected_frame_first() {
        use futures::StreamExt;

        let broadcaster = Broadcaster::new(8);
        let rx = broadcaster.subscribe().await;
        let mut stream = Box::pin(sse_stream(rx, Duration::from_secs(30)));

        let first = stream.next().await.expect("stream yields a first frame").expect("infallible");
        let payload = format!("{first:?}");
        assert!(payload.contains("connected"), "{payload}");
    }
}
