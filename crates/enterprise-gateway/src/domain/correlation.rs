//! Request identifiers for log correlation.
//!
//! Every request entering the pipeline carries a [`RequestId`]. Callers may
//! supply one through the `x-request-id` header; otherwise a UUID v7 is minted
//! so ids sort by arrival time in log output.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Header used to propagate a caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Time-ordered identifier attached to a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Mint a fresh id (UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s.trim()).map(Self)
    }

    /// Adopt the caller's id when it is a valid UUID, otherwise mint one.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| Self::parse(v).ok())
            .unwrap_or_default()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Milliseconds since the Unix epoch encoded in a v7 id.
    pub fn timestamp_ms(&self) -> Option<u64> {
        let bytes = self.0.as_bytes();
        if (bytes[6] >> 4) != 7 {
            return None;
        }
        Some(
            bytes[..6]
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        )
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
