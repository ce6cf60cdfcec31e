//! Nickname lock reconciliation.
//!
//! A [`Reconciler`] keeps every member of a locked group on one nickname. It
//! reacts to lock commands, nickname changes and joins, talks to the chat
//! platform through [`Platform`], and persists policy through a
//! [`PolicyStore`].

mod bulk;
mod clock;
mod debounce;
mod lanes;
mod outcome;
mod pending;
mod platform;
mod reconciler;
mod store;

pub use bulk::{ApplyFailure, BulkApplier, BulkReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::DebounceGuard;
pub use lanes::GroupLanes;
pub use outcome::{
    ChangeOutcome, CommandOutcome, IgnoreReason, Inbound, JoinBatch, JoinOutcome, Outcome,
    ScheduledJoin,
};
pub use pending::PendingCorrections;
pub use platform::{Platform, PlatformError, PlatformFut};
pub use reconciler::Reconciler;
pub use store::{JsonFileStore, MemoryStore, PolicyStore, StoreError};
