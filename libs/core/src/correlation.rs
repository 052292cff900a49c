//! Correlation ID joining a request to its response.
//!
//! Random UUID v4: 122 bits of entropy, so two ids colliding within a
//! process lifetime is not a practical concern. Sequential counters are
//! avoided because the response channel is shared with other processes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Whether a wire-level id refers to this correlation id
    ///
    /// Comparison is on the parsed UUID, so case and the braced/simple
    /// forms some executors echo back still match.
    pub fn matches(&self, wire: &str) -> bool {
        Self::parse(wire.trim()).is_ok_and(|other| other == *self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = (0..10_000).map(|_| CorrelationId::new()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn display_is_hyphenated_lowercase() {
        let id = CorrelationId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 36);
        assert_eq!(s, s.to_lowercase());
    }

    #[test]
    fn matches_alternate_spellings() {
        let id = CorrelationId::new();
        let upper = id.to_string().to_uppercase();
        let simple = id.as_uuid().simple().to_string();
        assert!(id.matches(&id.to_string()));
        assert!(id.matches(&upper));
        assert!(id.matches(&simple));
        assert!(!id.matches(&CorrelationId::new().to_string()));
        assert!(!id.matches("not-a-uuid"));
    }
}
