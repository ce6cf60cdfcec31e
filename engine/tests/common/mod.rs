//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use namelock_engine::{
    ManualClock, MemoryStore, Platform, PlatformError, PlatformFut, PolicyStore, Reconciler,
    StoreError,
};
use namelock_types::{
    GroupId, MemberId, PolicyDocument, ReconcileSettings, RosterEntry, ThreadPolicy, Timestamp,
};

pub const ADMIN: &str = "admin";
pub const START: Timestamp = Timestamp::from_millis(1_700_000_000_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub nickname: String,
    pub group: GroupId,
    pub member: MemberId,
    pub at: Instant,
}

/// Records every `set_nickname` and serves rosters that track those calls.
#[derive(Debug, Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    rosters: Mutex<HashMap<GroupId, Vec<RosterEntry>>>,
    failing: Mutex<HashSet<MemberId>>,
    roster_failure: Mutex<Option<PlatformError>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_roster(&self, group: &str, members: &[&str]) {
        let roster = members.iter().map(|id| RosterEntry::new(*id)).collect();
        self.rosters
            .lock()
            .unwrap()
            .insert(GroupId::new(group), roster);
    }

    pub fn set_roster_entries(&self, group: &str, roster: Vec<RosterEntry>) {
        self.rosters
            .lock()
            .unwrap()
            .insert(GroupId::new(group), roster);
    }

    pub fn fail_for(&self, member: &str) {
        self.failing.lock().unwrap().insert(MemberId::new(member));
    }

    pub fn fail_roster(&self, error: PlatformError) {
        *self.roster_failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `(member, nickname)` pairs in call order.
    pub fn call_log(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .map(|call| (call.member.to_string(), call.nickname))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Platform for FakePlatform {
    fn set_nickname<'a>(
        &'a self,
        nickname: &'a str,
        group: &'a GroupId,
        member: &'a MemberId,
    ) -> PlatformFut<'a, ()> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(Call {
                nickname: nickname.to_string(),
                group: group.clone(),
                member: member.clone(),
                at: Instant::now(),
            });
            if self.failing.lock().unwrap().contains(member) {
                return Err(PlatformError::RateLimited);
            }
            if let Some(roster) = self.rosters.lock().unwrap().get_mut(group) {
                for entry in roster.iter_mut().filter(|entry| &entry.member_id == member) {
                    entry.nickname = Some(nickname.to_string());
                }
            }
            Ok(())
        })
    }

    fn roster<'a>(&'a self, group: &'a GroupId) -> PlatformFut<'a, Vec<RosterEntry>> {
        Box::pin(async move {
            if let Some(error) = self.roster_failure.lock().unwrap().clone() {
                return Err(error);
            }
            Ok(self
                .rosters
                .lock()
                .unwrap()
                .get(group)
                .cloned()
                .unwrap_or_default())
        })
    }
}

/// Reads like a normal store, refuses every write.
#[derive(Debug, Default)]
pub struct ReadOnlyStore {
    inner: MemoryStore,
}

impl ReadOnlyStore {
    pub fn with_document(document: PolicyDocument) -> Self {
        Self {
            inner: MemoryStore::with_document(document),
        }
    }
}

impl PolicyStore for ReadOnlyStore {
    fn load(&self) -> PolicyDocument {
        self.inner.load()
    }

    fn save(&self, _document: &PolicyDocument) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }
}

pub fn settings() -> ReconcileSettings {
    ReconcileSettings {
        admins: [MemberId::new(ADMIN)].into_iter().collect(),
        debounce_window: Duration::from_millis(5_000),
        apply_delay: Duration::from_millis(1_000),
        correction_delay: Duration::from_millis(1_500),
        join_settle_delay: Duration::from_millis(3_000),
        ..ReconcileSettings::default()
    }
}

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_settings(settings: ReconcileSettings) -> Self {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(START));
        let reconciler = Reconciler::new(platform.clone(), store.clone(), clock.clone(), settings);
        Self {
            platform,
            store,
            clock,
            reconciler,
        }
    }

    pub fn policy(&self, group: &str) -> Option<ThreadPolicy> {
        self.store.snapshot().get(&GroupId::new(group)).cloned()
    }

    pub fn after(&self, millis: u64) -> Timestamp {
        START.saturating_add(Duration::from_millis(millis))
    }
}

pub fn group(id: &str) -> GroupId {
    GroupId::new(id)
}

pub fn member(id: &str) -> MemberId {
    MemberId::new(id)
}
