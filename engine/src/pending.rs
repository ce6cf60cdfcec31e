//! Cancellable delayed corrections, one slot per `(group, member)`.
//!
//! Scheduling into an occupied slot aborts the task already there. Lock
//! commands cancel every slot of their group so a correction computed against
//! an old policy never fires.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{AbortHandle, Abortable};
use tokio::task::JoinHandle;

use namelock_types::{GroupId, MemberId};

use crate::outcome::JoinOutcome;

type SlotKey = (GroupId, MemberId);

#[derive(Debug)]
struct Slot {
    ticket: u64,
    abort: AbortHandle,
}

#[derive(Debug, Default)]
struct Slots {
    next_ticket: u64,
    by_key: HashMap<SlotKey, Slot>,
}

#[derive(Debug, Default)]
pub struct PendingCorrections {
    slots: Mutex<Slots>,
}

impl PendingCorrections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `task` in the slot for `(group, member)`, aborting whatever was
    /// pending there. An aborted task resolves to [`JoinOutcome::Cancelled`].
    pub fn schedule<F>(self: &Arc<Self>, group: GroupId, member: MemberId, task: F) -> JoinHandle<JoinOutcome>
    where
        F: Future<Output = JoinOutcome> + Send + 'static,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let key = (group, member);

        // Held across the spawn so the task cannot clear its slot before it is filled.
        let mut slots = self.slots();
        let ticket = slots.next_ticket;
        slots.next_ticket += 1;

        let owner = Arc::clone(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = Abortable::new(task, registration)
                .await
                .unwrap_or(JoinOutcome::Cancelled);
            owner.release(&task_key, ticket);
            outcome
        });

        if let Some(replaced) = slots.by_key.insert(key, Slot { ticket, abort }) {
            tracing::debug!(ticket = replaced.ticket, "Replacing pending correction");
            replaced.abort.abort();
        }
        handle
    }

    fn release(&self, key: &SlotKey, ticket: u64) {
        let mut slots = self.slots();
        if slots.by_key.get(key).is_some_and(|slot| slot.ticket == ticket) {
            slots.by_key.remove(key);
        }
    }

    pub fn cancel(&self, group: &GroupId, member: &MemberId) -> bool {
        let removed = self.slots().by_key.remove(&(group.clone(), member.clone()));
        let Some(slot) = removed else {
            return false;
        };
        slot.abort.abort();
        true
    }

    /// Abort every pending correction for `group`. Returns how many were live.
    pub fn cancel_group(&self, group: &GroupId) -> usize {
        let mut slots = self.slots();
        let mut cancelled = 0;
        slots.by_key.retain(|(slot_group, _), slot| {
            if slot_group == group {
                slot.abort.abort();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots().by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
