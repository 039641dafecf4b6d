//! Control and telemetry agent for Docker Compose services
//!
//! - [`actions`]: single-flight start/stop/restart with precondition checks
//! - [`collector`]: interval-gated producers and the latest-value cache
//! - [`dispatcher`]: per-client subscriptions and fan-out of cached values
//! - [`telemetry`]: the collection and dispatch loops
//! - [`api`]: `POST /action`, `GET /health` and the `GET /ws` stream

pub mod actions;
pub mod api;
pub mod collector;
pub mod compose;
pub mod config;
pub mod dispatcher;
pub mod subscriptions;
pub mod telemetry;
pub mod topic;
pub mod util;

pub use topic::Topic;
