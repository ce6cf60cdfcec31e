//! The chat platform as seen by the engine: one mutation, one query.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use thiserror::Error;

use namelock_types::{GroupId, MemberId, RosterEntry};

pub type PlatformFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, PlatformError>> + Send + 'a>>;

/// Failure of a single platform call. Always transient from the engine's
/// point of view: it is logged, reported, and never retried within the event.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PlatformError {
    #[error("rate limited by platform")]
    RateLimited,
    #[error("member {0} is not in the group")]
    NotAMember(MemberId),
    #[error("group {0} is not reachable")]
    UnknownGroup(GroupId),
    #[error("platform request failed: {0}")]
    Request(String),
}

pub trait Platform: Send + Sync {
    /// Set `member`'s nickname in `group`. An empty `nickname` clears it.
    fn set_nickname<'a>(
        &'a self,
        nickname: &'a str,
        group: &'a GroupId,
        member: &'a MemberId,
    ) -> PlatformFut<'a, ()>;

    /// Current participants of `group`, with their nickname when known.
    fn roster<'a>(&'a self, group: &'a GroupId) -> PlatformFut<'a, Vec<RosterEntry>>;
}
