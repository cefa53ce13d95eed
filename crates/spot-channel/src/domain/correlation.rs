//! Correlation ID for matching responses to outstanding queries.
//!
//! Uses UUID v7: a 48-bit millisecond clock prefix followed by random bits,
//! so ids sort by creation time and collide only if the random suffix does.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier echoed by the server as `requestId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation ID (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse the textual form received on the wire.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
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
