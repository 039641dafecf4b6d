//! Error types for control actions

use thiserror::Error;

/// Why an action cannot run
///
/// The messages double as the client-facing rejection reasons.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Another action is in flight
    #[error("action already running")]
    AlreadyRunning,

    /// No executor is registered under the requested name
    #[error("action not found")]
    UnknownAction,

    /// The target service is not part of the compose project
    #[error("service not found")]
    UnknownService,

    /// `start` requested for a service that is not stopped
    #[error("service already running")]
    ServiceRunning,

    /// `stop` requested for a service that is not running
    #[error("service not running")]
    ServiceNotRunning,

    /// The precondition check itself failed
    #[error("failed to check service state: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Coarse classification used by the control boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    Internal,
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::AlreadyRunning
            | ActionError::UnknownAction
            | ActionError::UnknownService => ErrorKind::NotFound,
            ActionError::ServiceRunning | ActionError::ServiceNotRunning => {
                ErrorKind::PreconditionFailed
            }
            ActionError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
