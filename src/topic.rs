//! Telemetry topics a client can subscribe to

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named telemetry stream
///
/// The string form is used both in subscribe requests and as the event name of
/// every frame pushed to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Host CPU, memory and disk usage
    Metrics,
    /// Tail of the compose project's container logs
    Logs,
    /// Container list with per-service state
    Status,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Metrics, Topic::Logs, Topic::Status];

    /// Get the string representation (lowercase)
    ///
    /// This matches the serde serialization format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Metrics => "metrics",
            Topic::Logs => "logs",
            Topic::Status => "status",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name any topic
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics" => Ok(Topic::Metrics),
            "logs" => Ok(Topic::Logs),
            "status" => Ok(Topic::Status),
            other => Err(UnknownTopic(other.to_string())),
        }
    }
}
