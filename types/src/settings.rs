//! Resolved reconciliation settings shared across crates.
//!
//! Raw TOML structs (with `Option` fields) stay private in `namelock-config`.
//! The config loader resolves them into these types at the parse boundary.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::MemberId;

/// Default debounce window: notifications within this long after our own
/// write are treated as echoes.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(8_000);
/// Pause between consecutive nickname calls in a bulk apply.
pub const DEFAULT_APPLY_DELAY: Duration = Duration::from_millis(1_000);
/// Pause before correcting a single violation.
pub const DEFAULT_CORRECTION_DELAY: Duration = Duration::from_millis(1_500);
/// Pause after a join before setting the newcomer's nickname.
pub const DEFAULT_JOIN_SETTLE_DELAY: Duration = Duration::from_millis(3_000);

/// What an admin-authored nickname change does to the rest of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminOverride {
    /// Adopt the new nickname and re-apply it to the whole roster.
    #[default]
    Cascade,
    /// Adopt the new nickname and record only the changed member.
    RecordOnly,
}

impl AdminOverride {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cascade => "cascade",
            Self::RecordOnly => "record_only",
        }
    }
}

/// Members whose nickname changes redefine the lock instead of violating it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminList(BTreeSet<MemberId>);

impl AdminList {
    #[must_use]
    pub fn contains(&self, member: &MemberId) -> bool {
        self.0.contains(member)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<MemberId> for AdminList {
    fn from_iter<I: IntoIterator<Item = MemberId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Deployment-time tuning of the reconciler. Not mutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub admins: AdminList,
    pub debounce_window: Duration,
    pub apply_delay: Duration,
    pub correction_delay: Duration,
    pub join_settle_delay: Duration,
    pub admin_override: AdminOverride,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            admins: AdminList::default(),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            apply_delay: DEFAULT_APPLY_DELAY,
            correction_delay: DEFAULT_CORRECTION_DELAY,
            join_settle_delay: DEFAULT_JOIN_SETTLE_DELAY,
            admin_override: AdminOverride::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_override_uses_snake_case_names() {
        let parsed: AdminOverride = serde_json::from_str("\"record_only\"").expect("parse");
        assert_eq!(parsed, AdminOverride::RecordOnly);
        assert_eq!(AdminOverride::default().as_str(), "cascade");
    }

    #[test]
    fn admin_list_membership() {
        let admins: AdminList = ["1000a", "1000b"].into_iter().map(MemberId::new).collect();
        assert!(admins.contains(&MemberId::new("1000a")));
        assert!(!admins.contains(&MemberId::new("u1")));
        assert_eq!(admins.len(), 2);
    }
}
