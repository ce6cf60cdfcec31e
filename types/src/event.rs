//! Platform events consumed by the engine and the roster shape it reads back.

use serde::{Deserialize, Serialize};

use crate::{GroupId, MemberId};

/// A member's nickname changed in a group.
///
/// `new_value` is empty when the nickname was cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicknameChanged {
    pub group_id: GroupId,
    pub member_id: MemberId,
    #[serde(default)]
    pub new_value: String,
    pub actor_id: MemberId,
}

/// One or more members joined a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembersJoined {
    pub group_id: GroupId,
    pub member_ids: Vec<MemberId>,
}

/// A roster row: a member and, when the platform reports it, their current
/// nickname in the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub member_id: MemberId,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl RosterEntry {
    #[must_use]
    pub fn new(member_id: impl Into<MemberId>) -> Self {
        Self {
            member_id: member_id.into(),
            nickname: None,
        }
    }

    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }
}
