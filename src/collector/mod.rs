//! Telemetry collection
//!
//! Each topic is backed by one [`Collector`]: a producer plus the minimum time
//! between two polls. The [`CollectorRegistry`] caches the latest successful
//! value per topic.
//!
//! ## Built-in Producers
//!
//! - **metrics**: CPU, memory and root disk usage via `sysinfo`
//! - **logs**: tail of `docker compose logs`
//! - **status**: `docker compose ps` as a list of containers

pub mod producers;
pub mod registry;

pub use producers::{
    ComposeLogsProducer, ComposeStatusProducer, SystemMetrics, SystemMetricsProducer,
};
pub use registry::{Collector, CollectorRegistry, Producer};

use crate::{compose::ComposeClient, config::Config, topic::Topic};

/// A registry with the metrics, logs and status collectors configured
pub fn default_registry(config: &Config, compose: &ComposeClient) -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();

    registry.register(
        Topic::Metrics,
        SystemMetricsProducer::new(),
        config.interval(Topic::Metrics),
    );
    registry.register(
        Topic::Logs,
        ComposeLogsProducer::new(compose.clone(), config.log_tail),
        config.interval(Topic::Logs),
    );
    registry.register(
        Topic::Status,
        ComposeStatusProducer::new(compose.clone()),
        config.interval(Topic::Status),
    );

    registry
}
