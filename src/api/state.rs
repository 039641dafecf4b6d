//! API shared state

use std::sync::Arc;

use crate::actions::ActionRunner;
use crate::dispatcher::Dispatcher;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Single-flight runner behind `POST /action`
    pub runner: Arc<ActionRunner>,

    /// Subscriptions and client transports behind `GET /ws`
    pub dispatcher: Arc<Dispatcher>,
}

impl ApiState {
    pub fn new(runner: Arc<ActionRunner>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { runner, dispatcher }
    }
}
