use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of an outage queue (`"1"`, `"1.1"`, ...).
///
/// Opaque and compared by equality: the source may introduce new
/// sub-queues at any time, and `1` and `1.1` are different queues.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    /// Canonicalize a raw label. Returns `None` if nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let canonical = raw
            .trim()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':') || c.is_whitespace());
        if canonical.is_empty() {
            None
        } else {
            Some(QueueId(canonical.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueId::new(s).ok_or_else(|| format!("Invalid queue identifier '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form() {
        assert_eq!(QueueId::new(" 1.1. ").unwrap().as_str(), "1.1");
        assert_eq!(QueueId::new("2;").unwrap().as_str(), "2");
        assert_eq!(QueueId::new("3:").unwrap().as_str(), "3");
        assert!(QueueId::new(" .; ").is_none());
    }

    #[test]
    fn test_sub_queues_are_distinct() {
        assert_ne!(QueueId::new("1"), QueueId::new("1.1"));
        assert_eq!(QueueId::new("1.1"), QueueId::new("1.1."));
    }
}
