//! Request and response bodies of the control endpoint

use serde::{Deserialize, Serialize};

/// Body of a successful `POST /action`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Whether a control action is executing right now
    pub action_running: bool,
    /// Connected telemetry clients
    pub clients: usize,
}
