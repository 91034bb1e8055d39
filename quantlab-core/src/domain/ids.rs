//! Deterministic run identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic run identifier.
///
/// Derived by BLAKE3 from the canonical JSON serialization of the run
/// configuration (which includes the seed), so the same configuration
/// always produces the same id across builds and platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn from_canonical_config(config_json: &str) -> Self {
        Self(blake3::hash(config_json.as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines and report headers.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
