//! Compose-backed executors and precondition checks

use anyhow::Context;
use async_trait::async_trait;
use tracing::trace;

use crate::compose::ComposeClient;

use super::error::ActionError;
use super::runner::{ActionEntry, ActionExecutor, ActionName, ActionRunner, Validator};

/// Service state an action requires before it may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The service only has to exist
    Exists,
    /// The service must be stopped (`exited`)
    Stopped,
    /// The service must be `running`
    Running,
}

impl Requirement {
    pub fn for_action(action: ActionName) -> Self {
        match action {
            ActionName::Start => Requirement::Stopped,
            ActionName::Stop => Requirement::Running,
            ActionName::Restart => Requirement::Exists,
        }
    }

    /// Check a service's current state (`None` = not part of the project)
    pub fn check(&self, state: Option<&str>) -> Result<(), ActionError> {
        let state = state.ok_or(ActionError::UnknownService)?;

        match self {
            Requirement::Exists => Ok(()),
            Requirement::Stopped if state != "exited" => Err(ActionError::ServiceRunning),
            Requirement::Running if state != "running" => Err(ActionError::ServiceNotRunning),
            Requirement::Stopped | Requirement::Running => Ok(()),
        }
    }
}

/// Runs `docker compose <action> <service>`
pub struct ComposeExecutor {
    compose: ComposeClient,
    action: ActionName,
}

impl ComposeExecutor {
    pub fn new(compose: ComposeClient, action: ActionName) -> Self {
        Self { compose, action }
    }
}

#[async_trait]
impl ActionExecutor for ComposeExecutor {
    async fn execute(&self, service: &str) -> anyhow::Result<()> {
        self.compose
            .apply(self.action, service)
            .await
            .with_context(|| format!("failed to {} {service}", self.action))
    }
}

/// Looks up the service in `docker compose ps` and applies a [`Requirement`]
pub struct ServiceStateValidator {
    compose: ComposeClient,
    requirement: Requirement,
}

impl ServiceStateValidator {
    pub fn new(compose: ComposeClient, requirement: Requirement) -> Self {
        Self {
            compose,
            requirement,
        }
    }
}

#[async_trait]
impl Validator for ServiceStateValidator {
    async fn validate(&self, service: &str) -> Result<(), ActionError> {
        let state = self
            .compose
            .service_state(service)
            .await
            .context("failed to list compose services")?;

        trace!("{service} is {state:?}, requires {:?}", self.requirement);

        self.requirement.check(state.as_deref())
    }
}

/// A runner with start, stop and restart wired to the given compose project
pub fn compose_runner(compose: &ComposeClient) -> ActionRunner {
    let mut runner = ActionRunner::new();

    for action in ActionName::ALL {
        let entry = ActionEntry::new(ComposeExecutor::new(compose.clone(), action)).with_validator(
            ServiceStateValidator::new(compose.clone(), Requirement::for_action(action)),
        );
        runner.register(action, entry);
    }

    runner
}
