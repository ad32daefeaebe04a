//! Per-group logical locking (§5): the fuse read-modify-write cycle for one
//! group must be serialized against concurrent reports landing in the same
//! group, but unrelated groups must never block each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct GroupLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `group_id`, creating it on first use. The outer
    /// map lock is held only long enough to fetch or insert the entry.
    pub async fn lock_for(&self, group_id: i64) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(group_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
