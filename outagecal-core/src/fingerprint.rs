//! Content fingerprints for change detection.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::schedule::{QueueId, TimeRange};

/// Bumped whenever the canonical form changes, so old state reads as "changed".
const CANONICAL_VERSION: &str = "v2";

/// Digest of one queue's ordered outage ranges for one day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Fingerprint(value)
    }
}

/// Canonical text form: `v2:<queue>:HH:MM-HH:MM,HH:MM-HH:MM` (`v2:<queue>:`
/// when empty). The queue is part of it so switching queues resyncs.
pub fn canonical_form(queue: &QueueId, ranges: &[TimeRange]) -> String {
    let joined = ranges
        .iter()
        .map(TimeRange::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("{}:{}:{}", CANONICAL_VERSION, queue, joined)
}

pub fn fingerprint(queue: &QueueId, ranges: &[TimeRange]) -> Fingerprint {
    let digest = Sha256::digest(canonical_form(queue, ranges).as_bytes());
    Fingerprint(hex::encode(digest))
}
