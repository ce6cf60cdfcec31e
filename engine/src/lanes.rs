//! Per-group serialization.
//!
//! Holding a group's lane guarantees no other dispatched event for that group
//! is being handled. Different groups never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use namelock_types::GroupId;

#[derive(Debug, Default)]
pub struct GroupLanes {
    lanes: Mutex<HashMap<GroupId, Arc<AsyncMutex<()>>>>,
}

impl GroupLanes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `group`'s lane. Released when the guard drops.
    pub async fn enter(&self, group: &GroupId) -> OwnedMutexGuard<()> {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(lanes.entry(group.clone()).or_default())
        };
        lane.lock_owned().await
    }
}
