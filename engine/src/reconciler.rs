//! The reconciliation engine.
//!
//! Every handler takes a fresh snapshot from the [`PolicyStore`], decides, and
//! writes the whole document back through [`Shared::commit`]. Platform calls
//! never happen while the document is held, so a handler that waits on the
//! platform always re-reads before it records anything.

use std::sync::{Arc, Mutex, PoisonError};

use namelock_types::settings::AdminOverride;
use namelock_types::{
    GroupId, LockCommand, MalformedCommand, MemberId, MembersJoined, Nickname, NicknameChanged,
    PolicyDocument, ReconcileSettings, RosterEntry, Timestamp,
};

use crate::bulk::{BulkApplier, BulkReport};
use crate::clock::{Clock, SystemClock};
use crate::debounce::DebounceGuard;
use crate::lanes::GroupLanes;
use crate::outcome::{
    ChangeOutcome, CommandOutcome, IgnoreReason, Inbound, JoinBatch, JoinOutcome, Outcome,
    ScheduledJoin,
};
use crate::pending::PendingCorrections;
use crate::platform::Platform;
use crate::store::PolicyStore;

struct Shared {
    platform: Arc<dyn Platform>,
    store: Arc<dyn PolicyStore>,
    clock: Arc<dyn Clock>,
    settings: ReconcileSettings,
    debounce: DebounceGuard,
    pending: Arc<PendingCorrections>,
    lanes: GroupLanes,
    commit_gate: Mutex<()>,
}

impl Shared {
    /// Load, mutate, save under the commit gate.
    ///
    /// `mutate` returns `None` to abandon the write. Otherwise yields its value
    /// and whether the save went through.
    fn commit<T>(&self, mutate: impl FnOnce(&mut PolicyDocument) -> Option<T>) -> Option<(T, bool)> {
        let _gate = self
            .commit_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut document = self.store.load();
        let value = mutate(&mut document)?;
        let persisted = match self.store.save(&document) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to persist policy document: {e}");
                false
            }
        };
        Some((value, persisted))
    }

    /// The locked nickname for `group`, if enforcement is on.
    fn lock_target(&self, group: &GroupId) -> Option<String> {
        self.store
            .load()
            .locked(group)
            .map(|policy| policy.uniform_nickname.clone())
    }

    /// Record one member as carrying `value`, unless the lock moved on.
    fn record_member(&self, group: &GroupId, member: &MemberId, value: &str, at: Timestamp) -> bool {
        self.commit(|doc| {
            let policy = doc.locked_mut(group).filter(|p| p.is_compliant(value))?;
            policy.record(member.clone(), value, at);
            Some(())
        })
        .is_some_and(|((), persisted)| persisted)
    }

    fn applier(&self) -> BulkApplier<'_> {
        BulkApplier::new(
            self.platform.as_ref(),
            self.clock.as_ref(),
            self.settings.apply_delay,
        )
    }
}

/// Cheap to clone; clones share the store, platform and pending corrections.
#[derive(Clone)]
pub struct Reconciler {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("settings", &self.shared.settings)
            .field("pending_joins", &self.shared.pending.len())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn PolicyStore>,
        clock: Arc<dyn Clock>,
        settings: ReconcileSettings,
    ) -> Self {
        let debounce = DebounceGuard::new(settings.debounce_window);
        Self {
            shared: Arc::new(Shared {
                platform,
                store,
                clock,
                settings,
                debounce,
                pending: Arc::new(PendingCorrections::new()),
                lanes: GroupLanes::new(),
                commit_gate: Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn with_system_clock(
        platform: Arc<dyn Platform>,
        store: Arc<dyn PolicyStore>,
        settings: ReconcileSettings,
    ) -> Self {
        Self::new(platform, store, Arc::new(SystemClock), settings)
    }

    #[must_use]
    pub fn settings(&self) -> &ReconcileSettings {
        &self.shared.settings
    }

    /// Join corrections still waiting to fire.
    #[must_use]
    pub fn pending_joins(&self) -> usize {
        self.shared.pending.len()
    }

    /// Handle one inbound item while holding its group's lane.
    ///
    /// Join corrections are scheduled, not awaited; the lane is released as
    /// soon as they are queued.
    pub async fn dispatch(&self, inbound: Inbound) -> Outcome {
        let _lane = self.shared.lanes.enter(inbound.group_id()).await;
        match inbound {
            Inbound::Command { group_id, command } => {
                Outcome::Command(self.handle_command(&group_id, command).await)
            }
            Inbound::NicknameChanged(event) => {
                Outcome::Change(self.handle_nickname_changed(&event).await)
            }
            Inbound::MembersJoined(event) => Outcome::Joins(self.handle_members_joined(&event)),
        }
    }

    pub async fn handle_command(
        &self,
        group: &GroupId,
        command: Result<LockCommand, MalformedCommand>,
    ) -> CommandOutcome {
        match command {
            Ok(LockCommand::Activate(nickname)) => self.activate(group, nickname).await,
            Ok(LockCommand::Deactivate) => self.deactivate(group),
            Err(reason) => {
                tracing::debug!(%group, "Ignoring malformed lock command: {reason}");
                CommandOutcome::Ignored {
                    reason: IgnoreReason::MalformedCommand(reason),
                }
            }
        }
    }

    /// Convenience for hosts that already split the command arguments.
    pub async fn handle_args<S: AsRef<str>>(&self, group: &GroupId, args: &[S]) -> CommandOutcome {
        self.handle_command(group, LockCommand::from_args(args)).await
    }

    /// Lock `group` to `nickname` and apply it to everyone currently present.
    pub async fn activate(&self, group: &GroupId, nickname: Nickname) -> CommandOutcome {
        let shared = &self.shared;
        let cancelled_joins = shared.pending.cancel_group(group);
        let target: &str = &nickname;
        tracing::info!(%group, nickname = target, "Locking nicknames");

        // Store the new epoch first so anything racing us sees the new target.
        let stored = shared
            .commit(|doc| {
                doc.activate(group.clone(), target);
                Some(())
            })
            .is_some_and(|((), persisted)| persisted);

        let roster = match shared.platform.roster(group).await {
            Ok(roster) => roster,
            Err(error) => {
                tracing::warn!(%group, "Failed to fetch roster on activation: {error}");
                return CommandOutcome::Activated {
                    nickname,
                    report: BulkReport::default(),
                    roster_error: Some(error),
                    persisted: stored,
                    cancelled_joins,
                };
            }
        };

        let report = shared.applier().apply_all(group, target, &roster).await;
        let merged = shared
            .commit(|doc| {
                let policy = doc.locked_mut(group).filter(|p| p.is_compliant(target))?;
                policy.record_all(target, &report.applied);
                Some(())
            })
            .is_some_and(|((), persisted)| persisted);

        tracing::info!(
            %group,
            changed = report.changed,
            confirmed = report.confirmed,
            failed = report.failures.len(),
            "Applied locked nickname"
        );
        CommandOutcome::Activated {
            nickname,
            report,
            roster_error: None,
            persisted: stored && merged,
            cancelled_joins,
        }
    }

    /// Stop enforcing. History and the last nickname stay on record.
    pub fn deactivate(&self, group: &GroupId) -> CommandOutcome {
        let cancelled_joins = self.shared.pending.cancel_group(group);
        let committed = self.shared.commit(|doc| {
            let policy = doc.get_mut(group)?;
            policy.locked = false;
            Some(())
        });
        match committed {
            Some(((), persisted)) => {
                tracing::info!(%group, cancelled_joins, "Unlocked nicknames");
                CommandOutcome::Deactivated {
                    persisted,
                    cancelled_joins,
                }
            }
            None => {
                tracing::debug!(%group, "Unlock requested for a group that was never locked");
                CommandOutcome::Ignored {
                    reason: IgnoreReason::NoPolicy,
                }
            }
        }
    }

    /// React to a member's nickname changing.
    pub async fn handle_nickname_changed(&self, event: &NicknameChanged) -> ChangeOutcome {
        let shared = &self.shared;
        let group = &event.group_id;
        let member = &event.member_id;

        let document = shared.store.load();
        let Some(policy) = document.get(group) else {
            tracing::debug!(%group, %member, "No lock policy for group");
            return ChangeOutcome::Ignored {
                reason: IgnoreReason::NoPolicy,
            };
        };
        if !policy.locked {
            tracing::debug!(%group, %member, "Lock is off");
            return ChangeOutcome::Ignored {
                reason: IgnoreReason::Unlocked,
            };
        }

        if shared.settings.admins.contains(&event.actor_id) {
            return self.redefine(event).await;
        }

        let now = shared.clock.now();
        if policy.is_compliant(&event.new_value) {
            let persisted = shared.record_member(group, member, &event.new_value, now);
            return ChangeOutcome::Compliant { persisted };
        }

        if shared.debounce.is_echo(policy.last_applied_at(member), now) {
            tracing::debug!(%group, %member, "Ignoring change inside debounce window");
            return ChangeOutcome::Echo;
        }

        let target = policy.uniform_nickname.clone();
        self.correct(group, member, target).await
    }

    async fn correct(&self, group: &GroupId, member: &MemberId, target: String) -> ChangeOutcome {
        let shared = &self.shared;
        tracing::debug!(%group, %member, "Nickname drifted; correcting after delay");
        tokio::time::sleep(shared.settings.correction_delay).await;

        if shared.lock_target(group).as_deref() != Some(target.as_str()) {
            tracing::debug!(%group, %member, "Lock changed while correction waited");
            return ChangeOutcome::Superseded;
        }

        if let Err(error) = shared.platform.set_nickname(&target, group, member).await {
            tracing::warn!(%group, %member, "Failed to restore nickname: {error}");
            return ChangeOutcome::CorrectionFailed { error };
        }

        let at = shared.clock.now();
        let persisted = shared.record_member(group, member, &target, at);
        tracing::info!(%group, %member, nickname = %target, "Restored locked nickname");
        ChangeOutcome::Corrected { at, persisted }
    }

    /// An admin's change becomes the new lock target.
    async fn redefine(&self, event: &NicknameChanged) -> ChangeOutcome {
        let shared = &self.shared;
        let group = &event.group_id;
        let member = &event.member_id;
        let nickname = event.new_value.clone();
        let now = shared.clock.now();
        tracing::info!(
            %group,
            admin = %event.actor_id,
            nickname = %nickname,
            mode = shared.settings.admin_override.as_str(),
            "Admin redefined locked nickname"
        );

        let stored = shared
            .commit(|doc| {
                let policy = doc.locked_mut(group)?;
                policy.uniform_nickname.clone_from(&nickname);
                policy.record(member.clone(), nickname.as_str(), now);
                Some(())
            })
            .is_some_and(|((), persisted)| persisted);

        if shared.settings.admin_override == AdminOverride::RecordOnly {
            return ChangeOutcome::Redefined {
                nickname,
                cascade: None,
                roster_error: None,
                persisted: stored,
            };
        }

        let roster = match shared.platform.roster(group).await {
            Ok(roster) => with_known_nickname(roster, member, &nickname),
            Err(error) => {
                tracing::warn!(%group, "Failed to fetch roster for admin cascade: {error}");
                return ChangeOutcome::Redefined {
                    nickname,
                    cascade: None,
                    roster_error: Some(error),
                    persisted: stored,
                };
            }
        };

        let report = shared.applier().apply_all(group, &nickname, &roster).await;
        let merged = shared
            .commit(|doc| {
                let policy = doc
                    .locked_mut(group)
                    .filter(|p| p.is_compliant(&nickname))?;
                policy.record_all(&nickname, &report.applied);
                Some(())
            })
            .is_some_and(|((), persisted)| persisted);

        ChangeOutcome::Redefined {
            nickname,
            cascade: Some(report),
            roster_error: None,
            persisted: stored && merged,
        }
    }

    /// Schedule a settle-then-apply correction for every joining member.
    pub fn handle_members_joined(&self, event: &MembersJoined) -> JoinBatch {
        let shared = &self.shared;
        let group = &event.group_id;

        let document = shared.store.load();
        let target = match document.get(group) {
            None => return JoinBatch::Ignored(IgnoreReason::NoPolicy),
            Some(policy) if !policy.locked => return JoinBatch::Ignored(IgnoreReason::Unlocked),
            Some(policy) => policy.uniform_nickname.clone(),
        };

        let joins = event
            .member_ids
            .iter()
            .map(|member| {
                let this = self.clone();
                let task_group = group.clone();
                let task_member = member.clone();
                let task_target = target.clone();
                let handle = shared.pending.schedule(group.clone(), member.clone(), async move {
                    this.settle_join(&task_group, &task_member, &task_target).await
                });
                ScheduledJoin {
                    member_id: member.clone(),
                    handle,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(%group, joined = joins.len(), "Scheduled join corrections");
        JoinBatch::Scheduled(joins)
    }

    async fn settle_join(&self, group: &GroupId, member: &MemberId, target: &str) -> JoinOutcome {
        let shared = &self.shared;
        tokio::time::sleep(shared.settings.join_settle_delay).await;

        if shared.lock_target(group).as_deref() != Some(target) {
            tracing::debug!(%group, %member, "Lock changed before join correction fired");
            return JoinOutcome::Superseded;
        }

        if let Err(error) = shared.platform.set_nickname(target, group, member).await {
            tracing::warn!(%group, %member, "Failed to set nickname for new member: {error}");
            return JoinOutcome::Failed { error };
        }

        let at = shared.clock.now();
        let persisted = shared.record_member(group, member, target, at);
        tracing::info!(%group, %member, nickname = target, "Applied locked nickname to new member");
        JoinOutcome::Applied { at, persisted }
    }
}

/// The changed member already shows `nickname`; the bulk pass should confirm
/// them rather than call again.
fn with_known_nickname(
    mut roster: Vec<RosterEntry>,
    member: &MemberId,
    nickname: &str,
) -> Vec<RosterEntry> {
    for entry in &mut roster {
        if &entry.member_id == member {
            entry.nickname = Some(nickname.to_string());
        }
    }
    roster
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::platform::PlatformFut;

    struct NullPlatform;

    impl Platform for NullPlatform {
        fn set_nickname<'a>(
            &'a self,
            _nickname: &'a str,
            _group: &'a GroupId,
            _member: &'a MemberId,
        ) -> PlatformFut<'a, ()> {
            Box::pin(async { Ok(()) })
        }

        fn roster<'a>(&'a self, _group: &'a GroupId) -> PlatformFut<'a, Vec<RosterEntry>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn handler_futures_are_send() {
        let reconciler = Reconciler::new(
            Arc::new(NullPlatform),
            Arc::new(crate::store::MemoryStore::new()),
            Arc::new(crate::clock::ManualClock::default()),
            ReconcileSettings::default(),
        );
        let event = NicknameChanged {
            group_id: GroupId::new("g"),
            member_id: MemberId::new("u1"),
            new_value: String::new(),
            actor_id: MemberId::new("u1"),
        };
        assert_send(&reconciler.handle_nickname_changed(&event));
        assert_send(&reconciler.dispatch(Inbound::NicknameChanged(event.clone())));
    }

    #[test]
    fn known_nickname_overrides_only_the_changed_member() {
        let roster = vec![
            RosterEntry::new("u1").with_nickname("Old"),
            RosterEntry::new("u2").with_nickname("Old"),
        ];
        let patched = with_known_nickname(roster, &MemberId::new("u2"), "New");
        assert_eq!(patched[0].nickname.as_deref(), Some("Old"));
        assert_eq!(patched[1].nickname.as_deref(), Some("New"));
    }
}
