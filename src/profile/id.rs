//! Profile identities
//!
//! An identity names both the settings entry in the config document and the
//! session partition directory on disk, so it is restricted to `[A-Za-z0-9_-]`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, Result};

/// Validated profile identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfileId(String);

fn is_identity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

impl ProfileId {
    /// Strip every character outside the identity charset.
    /// Fails with `InvalidName` when nothing is left.
    pub fn sanitize(requested: &str) -> Result<Self> {
        let cleaned: String = requested.chars().filter(|c| is_identity_char(*c)).collect();
        if cleaned.is_empty() {
            return Err(ProfileError::InvalidName {
                requested: requested.to_string(),
            });
        }
        Ok(Self(cleaned))
    }

    /// Accept `raw` only if it already is a valid identity (no rewriting)
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || !raw.chars().all(is_identity_char) {
            return Err(ProfileError::InvalidName {
                requested: raw.to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Identity of the first-run / legacy profile
    pub fn default_identity() -> Self {
        Self(crate::constants::defaults::profile::IDENTITY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Partition directories may live on case-insensitive filesystems,
    /// so uniqueness is decided ignoring ASCII case.
    pub fn collides_with(&self, other: &ProfileId) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl TryFrom<String> for ProfileId {
    type Error = ProfileError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ProfileId> for String {
    fn from(id: ProfileId) -> Self {
        id.0
    }
}

impl FromStr for ProfileId {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for ProfileId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ProfileId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
