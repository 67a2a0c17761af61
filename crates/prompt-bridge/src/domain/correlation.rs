//! Correlation key joining an outbound command to its eventual result.
//!
//! Keys are opaque strings supplied by the caller. Generated keys use UUID v7
//! so they sort by creation time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest key accepted from a caller.
pub const MAX_KEY_LEN: usize = 256;

/// Correlation key for tracking a request through the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(String);

/// Why a string was rejected as a correlation key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("correlation key must not be empty")]
    Empty,
    #[error("correlation key is {0} bytes, limit is {1}")]
    TooLong(usize, usize),
}

impl CorrelationKey {
    /// Generate a fresh key (UUID v7).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Parse a caller-supplied key using the default length limit.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        Self::parse_with_limit(s, MAX_KEY_LEN)
    }

    /// Parse a caller-supplied key. Surrounding whitespace is not stripped:
    /// the key is echoed verbatim to the remote plugin.
    pub fn parse_with_limit(s: &str, max_len: usize) -> Result<Self, KeyError> {
        if s.trim().is_empty() {
            return Err(KeyError::Empty);
        }
        if s.len() > max_len {
            return Err(KeyError::TooLong(s.len(), max_len));
        }
        Ok(Self(s.to_string()))
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the key text.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
