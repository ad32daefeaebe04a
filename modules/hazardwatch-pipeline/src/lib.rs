//! Ties the pure classify/score/cluster/fuse engines to Postgres storage and
//! the SSE broadcaster, and orchestrates the per-report pipeline (§4.5).

pub mod broadcaster;
pub mod group_lock;
pub mod pipeline;
pub mod store;
pub mod worker_pool;

pub use broadcaster::{Broadcaster, Frame};
pub use pipeline::Pipeline;
pub use store::{NewReport, Store};
pub use worker_pool::WorkerPool;
