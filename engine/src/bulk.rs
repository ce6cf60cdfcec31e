//! Sequential, paced nickname application over a roster.
//!
//! Platforms flag accounts that rename many members in a burst, so calls are
//! spaced by a fixed delay. Members already showing the desired nickname are
//! confirmed without a call and without a delay. One member's failure never
//! stops the rest of the batch.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use namelock_types::{GroupId, MemberId, RosterEntry, Timestamp};

use crate::clock::Clock;
use crate::platform::{Platform, PlatformError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyFailure {
    pub member_id: MemberId,
    pub error: PlatformError,
}

/// What a bulk apply did. `applied` is what gets merged into the policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    /// Members now carrying the desired nickname, with their apply time.
    pub applied: BTreeMap<MemberId, Timestamp>,
    /// Members that already had the nickname (no call issued).
    pub confirmed: usize,
    /// Members whose nickname was changed by a call.
    pub changed: usize,
    pub failures: Vec<ApplyFailure>,
}

impl BulkReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct BulkApplier<'a> {
    platform: &'a dyn Platform,
    clock: &'a dyn Clock,
    per_call_delay: Duration,
}

impl<'a> BulkApplier<'a> {
    #[must_use]
    pub fn new(platform: &'a dyn Platform, clock: &'a dyn Clock, per_call_delay: Duration) -> Self {
        Self {
            platform,
            clock,
            per_call_delay,
        }
    }

    /// Apply `desired` to every roster entry, in roster order.
    pub async fn apply_all(
        &self,
        group: &GroupId,
        desired: &str,
        roster: &[RosterEntry],
    ) -> BulkReport {
        let mut report = BulkReport::default();
        let mut called_before = false;

        for entry in roster {
            let member = &entry.member_id;

            if entry.nickname.as_deref() == Some(desired) {
                report.applied.insert(member.clone(), self.clock.now());
                report.confirmed += 1;
                tracing::debug!(%group, %member, "Nickname already in place");
                continue;
            }

            if called_before && !self.per_call_delay.is_zero() {
                tokio::time::sleep(self.per_call_delay).await;
            }
            called_before = true;

            match self.platform.set_nickname(desired, group, member).await {
                Ok(()) => {
                    report.applied.insert(member.clone(), self.clock.now());
                    report.changed += 1;
                }
                Err(error) => {
                    tracing::warn!(%group, %member, "Failed to set nickname: {error}");
                    report.failures.push(ApplyFailure {
                        member_id: member.clone(),
                        error,
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::time::Instant;

    use super::*;
    use crate::clock::ManualClock;
    use crate::platform::PlatformFut;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Instant)>>,
        failing: Vec<&'static str>,
    }

    impl Platform for Recorder {
        fn set_nickname<'a>(
            &'a self,
            _nickname: &'a str,
            _group: &'a GroupId,
            member: &'a MemberId,
        ) -> PlatformFut<'a, ()> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((member.to_string(), Instant::now()));
                if self.failing.iter().any(|failing| *failing == member.as_str()) {
                    Err(PlatformError::Request("boom".to_string()))
                } else {
                    Ok(())
                }
            })
        }

        fn roster<'a>(&'a self, _group: &'a GroupId) -> PlatformFut<'a, Vec<RosterEntry>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn roster(ids: &[&str]) -> Vec<RosterEntry> {
        ids.iter().map(|id| RosterEntry::new(*id)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn failure_of_one_member_does_not_stop_the_batch() {
        let platform = Recorder {
            failing: vec!["m2"],
            ..Recorder::default()
        };
        let clock = ManualClock::new(Timestamp::from_millis(500));
        let applier = BulkApplier::new(&platform, &clock, Duration::from_millis(1_000));

        let report = applier
            .apply_all(&GroupId::new("g"), "Crew", &roster(&["m1", "m2", "m3"]))
            .await;

        let applied: Vec<&str> = report.applied.keys().map(MemberId::as_str).collect();
        assert_eq!(applied, vec!["m1", "m3"]);
        assert_eq!(report.changed, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].member_id.as_str(), "m2");
        assert_eq!(platform.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_paced_and_follow_roster_order() {
        let platform = Recorder::default();
        let clock = ManualClock::default();
        let delay = Duration::from_millis(1_000);
        let applier = BulkApplier::new(&platform, &clock, delay);

        applier
            .apply_all(&GroupId::new("g"), "Crew", &roster(&["b", "a", "c"]))
            .await;

        let calls = platform.calls.lock().unwrap();
        let order: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn compliant_members_are_confirmed_without_a_call() {
        let platform = Recorder::default();
        let clock = ManualClock::new(Timestamp::from_millis(42));
        let applier = BulkApplier::new(&platform, &clock, Duration::from_millis(1_000));
        let entries = vec![
            RosterEntry::new("m1").with_nickname("Crew"),
            RosterEntry::new("m2").with_nickname("Someone"),
            RosterEntry::new("m3"),
        ];

        let started = Instant::now();
        let report = applier.apply_all(&GroupId::new("g"), "Crew", &entries).await;

        assert_eq!(report.confirmed, 1);
        assert_eq!(report.changed, 2);
        assert_eq!(
            report.applied.get(&MemberId::new("m1")),
            Some(&Timestamp::from_millis(42))
        );
        let calls = platform.calls.lock().unwrap();
        let called: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(called, vec!["m2", "m3"]);
        // one gap between two calls, none for the confirmed member
        let elapsed = Instant::now() - started;
        assert!(elapsed >= Duration::from_millis(1_000));
        assert!(elapsed < Duration::from_millis(2_000));
    }
}
