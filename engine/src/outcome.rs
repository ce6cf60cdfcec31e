//! Structured results of every handler.
//!
//! Nothing the engine does is reported back to the command issuer. These
//! values are what a host logs, prints, or asserts on.

use serde::Serialize;
use tokio::task::JoinHandle;

use namelock_types::{
    GroupId, LockCommand, MalformedCommand, MemberId, MembersJoined, Nickname, NicknameChanged,
    Timestamp,
};

use crate::bulk::BulkReport;
use crate::platform::PlatformError;

/// Why an inbound command or event caused no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum IgnoreReason {
    MalformedCommand(MalformedCommand),
    NoPolicy,
    Unlocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Activated {
        nickname: Nickname,
        report: BulkReport,
        /// Set when the roster could not be fetched; the lock is still stored.
        roster_error: Option<PlatformError>,
        persisted: bool,
        cancelled_joins: usize,
    },
    Deactivated {
        persisted: bool,
        cancelled_joins: usize,
    },
    Ignored {
        #[serde(flatten)]
        reason: IgnoreReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChangeOutcome {
    Ignored {
        #[serde(flatten)]
        reason: IgnoreReason,
    },
    /// The member already carries the locked nickname.
    Compliant { persisted: bool },
    /// Inside the debounce window after our own write.
    Echo,
    Corrected { at: Timestamp, persisted: bool },
    CorrectionFailed { error: PlatformError },
    /// The policy was unlocked or re-targeted while the correction waited.
    Superseded,
    /// An admin changed the nickname; it is the new lock target.
    Redefined {
        nickname: String,
        cascade: Option<BulkReport>,
        roster_error: Option<PlatformError>,
        persisted: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JoinOutcome {
    Applied { at: Timestamp, persisted: bool },
    Failed { error: PlatformError },
    Superseded,
    /// Replaced by a newer join or cancelled by a lock command.
    Cancelled,
}

/// A delayed correction for one joining member.
#[derive(Debug)]
pub struct ScheduledJoin {
    pub member_id: MemberId,
    pub(crate) handle: JoinHandle<JoinOutcome>,
}

impl ScheduledJoin {
    /// Wait for the correction to settle.
    pub async fn outcome(self) -> JoinOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_panic() {
                    tracing::warn!(member = %self.member_id, "Join correction task panicked");
                }
                JoinOutcome::Cancelled
            }
        }
    }
}

#[derive(Debug)]
pub enum JoinBatch {
    Ignored(IgnoreReason),
    Scheduled(Vec<ScheduledJoin>),
}

impl JoinBatch {
    #[must_use]
    pub fn member_ids(&self) -> Vec<&MemberId> {
        match self {
            Self::Ignored(_) => Vec::new(),
            Self::Scheduled(joins) => joins.iter().map(|join| &join.member_id).collect(),
        }
    }

    /// Wait for every scheduled correction, in member order.
    pub async fn settle(self) -> Vec<(MemberId, JoinOutcome)> {
        let Self::Scheduled(joins) = self else {
            return Vec::new();
        };
        let mut settled = Vec::with_capacity(joins.len());
        for join in joins {
            let member = join.member_id.clone();
            settled.push((member, join.outcome().await));
        }
        settled
    }
}

/// Anything a host can feed into [`Reconciler::dispatch`](crate::Reconciler::dispatch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command {
        group_id: GroupId,
        command: Result<LockCommand, MalformedCommand>,
    },
    NicknameChanged(NicknameChanged),
    MembersJoined(MembersJoined),
}

impl Inbound {
    #[must_use]
    pub fn group_id(&self) -> &GroupId {
        match self {
            Self::Command { group_id, .. } => group_id,
            Self::NicknameChanged(event) => &event.group_id,
            Self::MembersJoined(event) => &event.group_id,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Command(CommandOutcome),
    Change(ChangeOutcome),
    Joins(JoinBatch),
}
