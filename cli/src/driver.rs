//! JSON-lines front end for the reconciler.
//!
//! One input line is one inbound item:
//!
//! ```text
//! {"type":"roster","group":"g","members":[{"member_id":"u1","nickname":"Al"}]}
//! {"type":"command","group":"g","text":"/nlock Captain"}
//! {"type":"nickname_changed","group_id":"g","member_id":"u1","new_value":"x","actor_id":"u1"}
//! {"type":"members_joined","group_id":"g","member_ids":["u9"]}
//! ```
//!
//! Each group gets its own worker so events for one group are handled in input
//! order while other groups proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use namelock_engine::{
    ChangeOutcome, CommandOutcome, Inbound, JoinOutcome, Outcome, Reconciler,
};
use namelock_types::{GroupId, MemberId, MembersJoined, NicknameChanged, RosterEntry, parse_invocation};

use crate::console::{ConsolePlatform, Emitter};

const GROUP_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputLine {
    Roster {
        group: GroupId,
        #[serde(default)]
        members: Vec<RosterEntry>,
    },
    Command {
        group: GroupId,
        text: String,
    },
    NicknameChanged(NicknameChanged),
    MembersJoined(MembersJoined),
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum OutputLine<'a> {
    Command {
        group: &'a GroupId,
        #[serde(flatten)]
        outcome: &'a CommandOutcome,
    },
    Change {
        group: &'a GroupId,
        member: &'a MemberId,
        #[serde(flatten)]
        outcome: &'a ChangeOutcome,
    },
    JoinsScheduled {
        group: &'a GroupId,
        members: Vec<&'a MemberId>,
    },
    Join {
        group: &'a GroupId,
        member: &'a MemberId,
        #[serde(flatten)]
        outcome: &'a JoinOutcome,
    },
    Skipped {
        line: usize,
        reason: String,
    },
}

/// Summary of one run, mostly for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub lines: usize,
    pub dispatched: usize,
    pub skipped: usize,
}

pub struct Driver {
    reconciler: Reconciler,
    platform: Arc<ConsolePlatform>,
    emitter: Emitter,
    workers: HashMap<GroupId, mpsc::Sender<Inbound>>,
    handles: Vec<JoinHandle<()>>,
}

impl Driver {
    pub fn new(reconciler: Reconciler, platform: Arc<ConsolePlatform>, emitter: Emitter) -> Self {
        Self {
            reconciler,
            platform,
            emitter,
            workers: HashMap::new(),
            handles: Vec::new(),
        }
    }

    /// Consume `input` to the end, then wait for every worker and every
    /// scheduled join correction.
    pub async fn run<R>(mut self, input: R) -> std::io::Result<RunStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut stats = RunStats::default();
        let mut lines = input.lines();

        while let Some(raw) = lines.next_line().await? {
            stats.lines += 1;
            if raw.trim().is_empty() {
                continue;
            }
            match self.accept(&raw).await {
                Ok(true) => stats.dispatched += 1,
                Ok(false) => {}
                Err(reason) => {
                    tracing::warn!(line = stats.lines, "Skipping input line: {reason}");
                    stats.skipped += 1;
                    self.emitter.emit(&OutputLine::Skipped {
                        line: stats.lines,
                        reason,
                    });
                }
            }
        }

        // Closing the queues lets each worker drain and exit.
        self.workers.clear();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Group worker ended abnormally: {e}");
            }
        }
        Ok(stats)
    }

    /// `Ok(true)` when the line was queued for the reconciler.
    async fn accept(&mut self, raw: &str) -> Result<bool, String> {
        let line: InputLine = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let inbound = match line {
            InputLine::Roster { group, members } => {
                tracing::debug!(%group, members = members.len(), "Seeding roster");
                self.platform.seed_roster(group, members);
                return Ok(false);
            }
            InputLine::Command { group, text } => {
                let Some(command) = parse_invocation(&text) else {
                    return Err(format!("not a lock command: {text:?}"));
                };
                Inbound::Command {
                    group_id: group,
                    command,
                }
            }
            InputLine::NicknameChanged(event) => Inbound::NicknameChanged(event),
            InputLine::MembersJoined(event) => Inbound::MembersJoined(event),
        };

        let queue = self.worker(inbound.group_id().clone());
        queue
            .send(inbound)
            .await
            .map_err(|_| "group worker stopped".to_string())?;
        Ok(true)
    }

    fn worker(&mut self, group: GroupId) -> mpsc::Sender<Inbound> {
        if let Some(queue) = self.workers.get(&group) {
            return queue.clone();
        }
        let (tx, rx) = mpsc::channel(GROUP_QUEUE_CAPACITY);
        let handle = tokio::spawn(group_worker(
            group.clone(),
            rx,
            self.reconciler.clone(),
            self.emitter.clone(),
        ));
        self.handles.push(handle);
        self.workers.insert(group, tx.clone());
        tx
    }
}

async fn group_worker(
    group: GroupId,
    mut rx: mpsc::Receiver<Inbound>,
    reconciler: Reconciler,
    emitter: Emitter,
) {
    let mut joins = Vec::new();

    while let Some(inbound) = rx.recv().await {
        let member = match &inbound {
            Inbound::NicknameChanged(event) => Some(event.member_id.clone()),
            _ => None,
        };

        match reconciler.dispatch(inbound).await {
            Outcome::Command(outcome) => emitter.emit(&OutputLine::Command {
                group: &group,
                outcome: &outcome,
            }),
            Outcome::Change(outcome) => {
                if let Some(member) = &member {
                    emitter.emit(&OutputLine::Change {
                        group: &group,
                        member,
                        outcome: &outcome,
                    });
                }
            }
            Outcome::Joins(batch) => {
                emitter.emit(&OutputLine::JoinsScheduled {
                    group: &group,
                    members: batch.member_ids(),
                });
                let group = group.clone();
                let emitter = emitter.clone();
                joins.push(tokio::spawn(async move {
                    for (member, outcome) in batch.settle().await {
                        emitter.emit(&OutputLine::Join {
                            group: &group,
                            member: &member,
                            outcome: &outcome,
                        });
                    }
                }));
            }
        }
    }

    for join in joins {
        if let Err(e) = join.await {
            tracing::warn!(%group, "Join reporter ended abnormally: {e}");
        }
    }
}
