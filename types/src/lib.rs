//! Domain types for namelock: identifiers, lock policy, commands and events.
//!
//! No IO and no async. The engine, config and binary all build on these.

#![allow(clippy::missing_errors_doc)]

pub mod command;
mod event;
mod ids;
mod policy;
pub mod settings;
mod text;

pub use command::{LockCommand, MalformedCommand, parse_invocation};
pub use event::{MembersJoined, NicknameChanged, RosterEntry};
pub use ids::{GroupId, MemberId, Timestamp};
pub use policy::{MemberState, PolicyDocument, ThreadPolicy};
pub use settings::{AdminList, AdminOverride, ReconcileSettings};
pub use text::{BlankNicknameError, Nickname};
