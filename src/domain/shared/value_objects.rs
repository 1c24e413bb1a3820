//! Shared value objects used across multiple bounded contexts

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of trailing digits that must agree for two keys to name the same
/// call target.
const SUFFIX_MATCH_DIGITS: usize = 7;

/// Phone number normalized to digits only
///
/// This is the join key across the identity registry, the outgoing marker,
/// the finalization guard and the call-log rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneKey(String);

impl PhoneKey {
    /// Strip everything that is not an ASCII digit
    pub fn normalize(raw: &str) -> Self {
        Self(raw.chars().filter(|c| c.is_ascii_digit()).collect())
    }

    /// Normalize, returning `None` when no digits remain
    pub fn parse(raw: &str) -> Option<Self> {
        let key = Self::normalize(raw);
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Placeholder key for events whose number is still unknown
    pub fn unknown() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exact match, or the last seven digits agree.
    ///
    /// Tolerates a country code being added or stripped by one of the
    /// signal sources. Empty keys never match.
    pub fn matches(&self, other: &PhoneKey) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.0 == other.0 {
            return true;
        }
        match (self.suffix(), other.suffix()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn suffix(&self) -> Option<&str> {
        if self.0.len() < SUFFIX_MATCH_DIGITS {
            return None;
        }
        Some(&self.0[self.0.len() - SUFFIX_MATCH_DIGITS..])
    }
}

impl fmt::Display for PhoneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fuzzy match on raw, un-normalized numbers
pub fn numbers_match(a: &str, b: &str) -> bool {
    PhoneKey::normalize(a).matches(&PhoneKey::normalize(b))
}

/// Correlation identifier grouping every signal of one physical call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
