//! Simulated platform for the line-oriented host.
//!
//! Rosters are seeded from input; every `set_nickname` is written out as a JSON
//! line and reflected back into the seeded roster.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use namelock_engine::{Platform, PlatformError, PlatformFut};
use namelock_types::{GroupId, MemberId, RosterEntry};

/// Serialized JSON-lines writer shared by the platform and the driver.
#[derive(Clone)]
pub struct Emitter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Emitter {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn emit(&self, line: &impl Serialize) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *sink, line)
            .map_err(std::io::Error::from)
            .and_then(|()| sink.write_all(b"\n"))
            .and_then(|()| sink.flush());
        if let Err(e) = written {
            tracing::warn!("Failed to write output line: {e}");
        }
    }
}

#[derive(Serialize)]
struct SetNicknameLine<'a> {
    event: &'static str,
    group: &'a GroupId,
    member: &'a MemberId,
    nickname: &'a str,
}

pub struct ConsolePlatform {
    rosters: Mutex<HashMap<GroupId, Vec<RosterEntry>>>,
    emitter: Emitter,
}

impl ConsolePlatform {
    pub fn new(emitter: Emitter) -> Self {
        Self {
            rosters: Mutex::new(HashMap::new()),
            emitter,
        }
    }

    /// Replace what the platform reports as `group`'s participants.
    pub fn seed_roster(&self, group: GroupId, members: Vec<RosterEntry>) {
        self.rosters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group, members);
    }
}

impl Platform for ConsolePlatform {
    fn set_nickname<'a>(
        &'a self,
        nickname: &'a str,
        group: &'a GroupId,
        member: &'a MemberId,
    ) -> PlatformFut<'a, ()> {
        Box::pin(async move {
            self.emitter.emit(&SetNicknameLine {
                event: "set_nickname",
                group,
                member,
                nickname,
            });

            let mut rosters = self.rosters.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(roster) = rosters.get_mut(group) {
                match roster.iter_mut().find(|entry| &entry.member_id == member) {
                    Some(entry) => entry.nickname = Some(nickname.to_string()),
                    None => roster.push(RosterEntry::new(member.clone()).with_nickname(nickname)),
                }
            }
            Ok(())
        })
    }

    fn roster<'a>(&'a self, group: &'a GroupId) -> PlatformFut<'a, Vec<RosterEntry>> {
        Box::pin(async move {
            self.rosters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(group)
                .cloned()
                .ok_or_else(|| PlatformError::UnknownGroup(group.clone()))
        })
    }
}
