//! Echo suppression for our own nickname writes.
//!
//! Every corrective `set_nickname` comes back to us as a change notification.
//! Notifications that arrive within the window after our last apply to that
//! member are treated as echoes and dropped. This is a timing heuristic, not a
//! causal link to a specific write.

use std::time::Duration;

use namelock_types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceGuard {
    window: Duration,
}

impl DebounceGuard {
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self { window }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// True iff `now - last_applied_at < window`.
    ///
    /// A `now` earlier than `last_applied_at` (clock skew between writers) is
    /// inside the window.
    #[must_use]
    pub fn should_ignore(&self, last_applied_at: Timestamp, now: Timestamp) -> bool {
        match now.duration_since(last_applied_at) {
            Some(elapsed) => elapsed < self.window,
            None => true,
        }
    }

    /// [`should_ignore`](Self::should_ignore) for a member that may have no
    /// recorded apply yet. Unknown members are never echoes.
    #[must_use]
    pub fn is_echo(&self, last_applied_at: Option<Timestamp>, now: Timestamp) -> bool {
        last_applied_at.is_some_and(|last| self.should_ignore(last, now))
    }
}
