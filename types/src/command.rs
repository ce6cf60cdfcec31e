//! Lock command parsing.
//!
//! ```text
//! /nlock Captain Hook    -> Activate("Captain Hook")
//! /permanick OFF         -> Deactivate
//! /nlock                 -> MalformedCommand::MissingArgument
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::text::Nickname;

/// Names the lock command answers to. The first is canonical.
pub const COMMAND_NAMES: [&str; 3] = ["nicknamelock", "nlock", "permanick"];

/// Argument that turns the lock off (case-insensitive).
pub const DEACTIVATE_TOKEN: &str = "off";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockCommand {
    Activate(Nickname),
    Deactivate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedCommand {
    #[error("missing nickname argument")]
    MissingArgument,
    #[error("nickname must not be blank")]
    BlankNickname,
}

impl LockCommand {
    /// Parse pre-split arguments, as handed over by a command dispatcher.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, MalformedCommand> {
        let first = match args.first() {
            Some(first) if !first.as_ref().is_empty() => first.as_ref(),
            _ => return Err(MalformedCommand::MissingArgument),
        };
        if first.eq_ignore_ascii_case(DEACTIVATE_TOKEN) {
            return Ok(Self::Deactivate);
        }

        let joined = args
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");
        Nickname::new(joined)
            .map(Self::Activate)
            .map_err(|_| MalformedCommand::BlankNickname)
    }

    /// Parse the raw text following the command token. Inner spacing of the
    /// nickname is preserved.
    pub fn from_remainder(rest: &str) -> Result<Self, MalformedCommand> {
        let rest = rest.trim();
        let Some(first) = rest.split_whitespace().next() else {
            return Err(MalformedCommand::MissingArgument);
        };
        if first.eq_ignore_ascii_case(DEACTIVATE_TOKEN) {
            return Ok(Self::Deactivate);
        }
        Nickname::new(rest)
            .map(Self::Activate)
            .map_err(|_| MalformedCommand::BlankNickname)
    }
}

/// Recognize a full chat line such as `/nlock Captain`.
///
/// Returns `None` when the line is not addressed to the lock command. A single
/// leading prefix character (`/`, `!`, `.`, ...) is accepted.
#[must_use]
pub fn parse_invocation(line: &str) -> Option<Result<LockCommand, MalformedCommand>> {
    let line = line.trim_start();
    let line = match line.chars().next() {
        Some(c) if !c.is_alphanumeric() => &line[c.len_utf8()..],
        _ => line,
    };

    let (name, rest) = match line.find(char::is_whitespace) {
        Some(idx) => line.split_at(idx),
        None => (line, ""),
    };
    if !COMMAND_NAMES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
    {
        return None;
    }
    Some(LockCommand::from_remainder(rest))
}
