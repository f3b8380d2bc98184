//! Tag identifiers
//!
//! A [`TagUid`] is the hexadecimal identifier a proximity reader reports for
//! a tag or card. It is trimmed and upper-cased on construction so that
//! `"04a1b2 "` and `"04A1B2"` address the same binding.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Normalised hexadecimal tag identifier, the registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagUid(String);

impl TagUid {
    /// Parse and normalise a raw identifier
    ///
    /// Surrounding whitespace is removed and hex digits are upper-cased.
    /// Empty input and non-hex characters are rejected.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyUid);
        }
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::MalformedUid(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TagUid {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TagUid {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TagUid> for String {
    fn from(uid: TagUid) -> Self {
        uid.0
    }
}

impl AsRef<str> for TagUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
