//! Single-flight runner for control actions
//!
//! At most one action executes at a time, process-wide. Preconditions are
//! checked up front by [`ActionRunner::assert_runnable`] so callers get a
//! specific rejection instead of silently losing a race; the execution itself
//! is fire-and-forget.
//!
//! The busy flag is an atomic claimed with compare-and-swap and released by a
//! drop guard, so executions spawned on different worker threads can never
//! overlap and a failing or panicking executor cannot leave it set.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::error::ActionError;

/// The closed set of control actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionName {
    Start,
    Stop,
    Restart,
}

impl ActionName {
    pub const ALL: [ActionName; 3] = [ActionName::Start, ActionName::Stop, ActionName::Restart];

    /// Lowercase name, also the compose subcommand
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::Start => "start",
            ActionName::Stop => "stop",
            ActionName::Restart => "restart",
        }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionName {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionName::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or(ActionError::UnknownAction)
    }
}

/// Performs the side effect of an action against one service
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, service: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> ActionExecutor for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn execute(&self, service: &str) -> anyhow::Result<()> {
        (self)(service.to_string()).await
    }
}

/// Checks whether an action may run against a service right now
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, service: &str) -> Result<(), ActionError>;
}

#[async_trait]
impl<F, Fut> Validator for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ActionError>> + Send,
{
    async fn validate(&self, service: &str) -> Result<(), ActionError> {
        (self)(service.to_string()).await
    }
}

/// An executor plus its optional precondition check
#[derive(Clone)]
pub struct ActionEntry {
    executor: Arc<dyn ActionExecutor>,
    validator: Option<Arc<dyn Validator>>,
}

impl ActionEntry {
    pub fn new(executor: impl ActionExecutor + 'static) -> Self {
        Self {
            executor: Arc::new(executor),
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

/// Holds the busy flag for the lifetime of one execution
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Registry of actions guarded by a single in-flight slot
///
/// Populate it with [`ActionRunner::register`] at startup, then share it
/// behind an `Arc`.
#[derive(Default)]
pub struct ActionRunner {
    actions: HashMap<ActionName, ActionEntry>,
    busy: AtomicBool,
}

impl ActionRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the entry for `name`
    pub fn register(&mut self, name: ActionName, entry: ActionEntry) {
        if self.actions.insert(name, entry).is_some() {
            debug!("replaced registration for {name}");
        }
    }

    /// Whether an action is currently executing
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Check that `name` could run against `service` right now
    ///
    /// Never touches the busy flag and never invokes the executor.
    #[instrument(skip(self))]
    pub async fn assert_runnable(&self, name: ActionName, service: &str) -> Result<(), ActionError> {
        if self.is_busy() {
            return Err(ActionError::AlreadyRunning);
        }

        let entry = self.actions.get(&name).ok_or(ActionError::UnknownAction)?;

        match &entry.validator {
            Some(validator) => validator.validate(service).await,
            None => Ok(()),
        }
    }

    /// Run `name` against `service` unless another action is in flight
    ///
    /// A call made while busy returns immediately without running anything.
    /// Executor failures are logged and swallowed.
    #[instrument(skip(self))]
    pub async fn execute(&self, name: ActionName, service: &str) {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            debug!("an action is already running, dropping {name} on {service}");
            return;
        };

        let Some(entry) = self.actions.get(&name) else {
            warn!("no executor registered for {name}");
            return;
        };

        info!("running {name} on {service}");

        match entry.executor.execute(service).await {
            Ok(()) => info!("{name} on {service} finished"),
            Err(e) => error!("{name} on {service} failed: {:#}", e),
        }
    }

    /// Schedule [`ActionRunner::execute`] on the runtime without waiting for it
    pub fn spawn_execute(self: &Arc<Self>, name: ActionName, service: String) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.execute(name, &service).await })
    }
}
