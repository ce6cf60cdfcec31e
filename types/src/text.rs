//! Nickname text type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A desired nickname, guaranteed to be non-empty after trimming.
///
/// Only the activation command produces these. Values reported by the platform
/// (or set by an admin override) may legitimately be empty and travel as plain
/// `String`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Nickname(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("nickname must not be blank")]
pub struct BlankNicknameError;

impl Nickname {
    /// Build a nickname, trimming surrounding whitespace. Inner spacing is kept.
    pub fn new(value: impl AsRef<str>) -> Result<Self, BlankNicknameError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            Err(BlankNicknameError)
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Nickname {
    type Error = BlankNicknameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Nickname {
    type Error = BlankNicknameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Nickname> for String {
    fn from(value: Nickname) -> Self {
        value.0
    }
}

impl std::ops::Deref for Nickname {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for Nickname {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nickname_rejects_blank() {
        assert!(Nickname::new("").is_err());
        assert!(Nickname::new("  \t ").is_err());
    }

    #[test]
    fn nickname_trims_ends_but_keeps_inner_spacing() {
        let nick = Nickname::new("  Captain   Hook ").expect("non-blank");
        assert_eq!(nick.as_str(), "Captain   Hook");
    }
}
