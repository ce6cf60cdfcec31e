//! Persisted per-group lock policy.
//!
//! The document shape is what gets written to disk:
//!
//! ```json
//! {
//!   "<groupId>": {
//!     "locked": true,
//!     "uniformNickname": "Captain",
//!     "members": { "<memberId>": { "value": "Captain", "lastAppliedAt": 1700000000000 } }
//!   }
//! }
//! ```
//!
//! Older documents used `defaultNick`, `nicks` and `ts`; those names are still
//! accepted on read.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{GroupId, MemberId, Timestamp};

/// What the engine believes is applied to one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberState {
    pub value: String,
    #[serde(alias = "ts", default)]
    pub last_applied_at: Timestamp,
}

/// Lock policy for one group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPolicy {
    #[serde(default)]
    pub locked: bool,
    #[serde(alias = "defaultNick", default)]
    pub uniform_nickname: String,
    #[serde(alias = "nicks", default)]
    pub members: BTreeMap<MemberId, MemberState>,
}

impl ThreadPolicy {
    #[must_use]
    pub fn locked_to(nickname: impl Into<String>) -> Self {
        Self {
            locked: true,
            uniform_nickname: nickname.into(),
            members: BTreeMap::new(),
        }
    }

    /// Whether `value` matches the desired nickname.
    #[must_use]
    pub fn is_compliant(&self, value: &str) -> bool {
        self.uniform_nickname == value
    }

    /// Start a fresh enforcement epoch: lock to `nickname` and forget all
    /// per-member history.
    pub fn reset_epoch(&mut self, nickname: impl Into<String>) {
        self.locked = true;
        self.uniform_nickname = nickname.into();
        self.members.clear();
    }

    #[must_use]
    pub fn member(&self, id: &MemberId) -> Option<&MemberState> {
        self.members.get(id)
    }

    #[must_use]
    pub fn last_applied_at(&self, id: &MemberId) -> Option<Timestamp> {
        self.members.get(id).map(|state| state.last_applied_at)
    }

    /// Record that `value` is applied to `member` as of `at`.
    ///
    /// `lastAppliedAt` never moves backwards: a stale writer keeps the newer
    /// timestamp already on record.
    pub fn record(&mut self, member: MemberId, value: impl Into<String>, at: Timestamp) {
        let value = value.into();
        match self.members.get_mut(&member) {
            Some(state) => {
                state.value = value;
                state.last_applied_at = state.last_applied_at.max(at);
            }
            None => {
                self.members.insert(
                    member,
                    MemberState {
                        value,
                        last_applied_at: at,
                    },
                );
            }
        }
    }

    /// Merge a batch of applies of `value` into the member map.
    pub fn record_all<'a>(
        &mut self,
        value: &str,
        applied: impl IntoIterator<Item = (&'a MemberId, &'a Timestamp)>,
    ) {
        for (member, at) in applied {
            self.record(member.clone(), value, *at);
        }
    }
}

/// The whole persisted snapshot: group id to policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyDocument(BTreeMap<GroupId, ThreadPolicy>);

impl PolicyDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, group: &GroupId) -> Option<&ThreadPolicy> {
        self.0.get(group)
    }

    pub fn get_mut(&mut self, group: &GroupId) -> Option<&mut ThreadPolicy> {
        self.0.get_mut(group)
    }

    /// The policy for `group` if one exists and is currently enforcing.
    #[must_use]
    pub fn locked(&self, group: &GroupId) -> Option<&ThreadPolicy> {
        self.0.get(group).filter(|policy| policy.locked)
    }

    pub fn locked_mut(&mut self, group: &GroupId) -> Option<&mut ThreadPolicy> {
        self.0.get_mut(group).filter(|policy| policy.locked)
    }

    pub fn insert(&mut self, group: GroupId, policy: ThreadPolicy) -> Option<ThreadPolicy> {
        self.0.insert(group, policy)
    }

    /// Lock `group` to `nickname`, creating the policy on first use and
    /// resetting member history otherwise.
    pub fn activate(&mut self, group: GroupId, nickname: &str) -> &mut ThreadPolicy {
        let policy = self.0.entry(group).or_default();
        policy.reset_epoch(nickname);
        policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupId, &ThreadPolicy)> {
        self.0.iter()
    }
}

impl FromIterator<(GroupId, ThreadPolicy)> for PolicyDocument {
    fn from_iter<I: IntoIterator<Item = (GroupId, ThreadPolicy)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn record_never_moves_last_applied_backwards() {
        let mut policy = ThreadPolicy::locked_to("A");
        let u1 = MemberId::new("u1");
        policy.record(u1.clone(), "A", ts(500));
        policy.record(u1.clone(), "A", ts(300));
        assert_eq!(policy.last_applied_at(&u1), Some(ts(500)));

        policy.record(u1.clone(), "A", ts(900));
        assert_eq!(policy.last_applied_at(&u1), Some(ts(900)));
    }

    #[test]
    fn activate_on_existing_group_discards_history() {
        let group = GroupId::new("g");
        let mut doc = PolicyDocument::new();
        let policy = doc.activate(group.clone(), "A");
        policy.record(MemberId::new("u1"), "A", ts(100));
        policy.locked = false;

        let policy = doc.activate(group.clone(), "B");
        assert!(policy.locked);
        assert_eq!(policy.uniform_nickname, "B");
        assert!(policy.members.is_empty());
    }

    #[test]
    fn document_round_trips_canonical_field_names() {
        let mut doc = PolicyDocument::new();
        doc.activate(GroupId::new("g1"), "Captain")
            .record(MemberId::new("u1"), "Captain", ts(42));

        let json = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "g1": {
                    "locked": true,
                    "uniformNickname": "Captain",
                    "members": { "u1": { "value": "Captain", "lastAppliedAt": 42 } }
                }
            })
        );
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let raw = r#"{
            "g1": {
                "locked": true,
                "uniform": true,
                "defaultNick": "Old",
                "nicks": { "u1": { "value": "Old", "ts": 1700 } }
            }
        }"#;
        let doc: PolicyDocument = serde_json::from_str(raw).expect("legacy document");
        let policy = doc.get(&GroupId::new("g1")).expect("policy");
        assert!(policy.locked);
        assert_eq!(policy.uniform_nickname, "Old");
        assert_eq!(policy.last_applied_at(&MemberId::new("u1")), Some(ts(1700)));
    }

    #[test]
    fn locked_filters_out_deactivated_groups() {
        let group = GroupId::new("g");
        let mut doc = PolicyDocument::new();
        doc.activate(group.clone(), "A");
        assert!(doc.locked(&group).is_some());

        if let Some(policy) = doc.get_mut(&group) {
            policy.locked = false;
        }
        assert!(doc.locked(&group).is_none());
        assert!(doc.get(&group).is_some());
    }
}
