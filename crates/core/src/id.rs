//! Identifiers for trackers, children and tracking sessions.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Stable identifier of a child entry inside its parent tracker.
///
/// ULIDs sort by creation time, so a map keyed by `ChildId` iterates
/// children in the order they were allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChildId(Ulid);

impl ChildId {
    /// Generate a new ChildId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ChildId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ChildId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Opaque key under which a tracking session's transport is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgressKey(String);

impl ProgressKey {
    /// Wrap an existing key, e.g. one received from a client.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generate a fresh key for a session labelled `code`.
    pub fn generate(code: &str) -> Self {
        let id = Ulid::new().to_string().to_lowercase();
        if code.is_empty() {
            Self(id)
        } else {
            Self(format!("{code}-{id}"))
        }
    }

    /// Borrow the key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProgressKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ProgressKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}
