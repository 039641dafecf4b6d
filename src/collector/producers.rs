//! Producers for the built-in topics

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sysinfo::{Disks, System};
use tracing::trace;

use crate::compose::ComposeClient;

use super::registry::Producer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage: CpuUsage,
    pub memory_usage: MemoryUsage,
    pub disk_usage: Option<DiskUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuUsage {
    pub percent: f32,
    pub cores: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f32,
}

fn percent(part: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 100.0) as f32
}

impl SystemMetrics {
    /// Sample a refreshed `System`
    ///
    /// CPU usage is relative to the previous refresh of the same instance.
    pub fn sample(sys: &mut System) -> Self {
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let total = sys.total_memory();
        let available = sys.available_memory();

        let disks = Disks::new_with_refreshed_list();
        let disk_usage = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .map(|disk| {
                let total = disk.total_space();
                let free = disk.available_space();
                let used = total.saturating_sub(free);
                DiskUsage {
                    total,
                    used,
                    free,
                    percent: percent(used, total),
                }
            });

        SystemMetrics {
            cpu_usage: CpuUsage {
                percent: sys.global_cpu_usage(),
                cores: sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect(),
            },
            memory_usage: MemoryUsage {
                total,
                available,
                used: total.saturating_sub(available),
                percent: percent(total.saturating_sub(available), total),
            },
            disk_usage,
        }
    }
}

/// Host CPU, memory and root disk usage
pub struct SystemMetricsProducer {
    sys: Arc<Mutex<System>>,
}

impl SystemMetricsProducer {
    pub fn new() -> Self {
        let mut sys = System::new();
        // prime the CPU counters so the first poll reports a real delta
        sys.refresh_cpu_usage();
        Self {
            sys: Arc::new(Mutex::new(sys)),
        }
    }
}

impl Default for SystemMetricsProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for SystemMetricsProducer {
    async fn produce(&self) -> Result<Option<Value>> {
        let sys = Arc::clone(&self.sys);

        let metrics = tokio::task::spawn_blocking(move || {
            let mut sys = sys.lock().unwrap_or_else(PoisonError::into_inner);
            SystemMetrics::sample(&mut sys)
        })
        .await
        .context("system metrics sampler panicked")?;

        trace!("cpu at {:.1}%", metrics.cpu_usage.percent);

        Ok(Some(serde_json::to_value(metrics)?))
    }
}

/// Tail of the compose project's logs as a single string
pub struct ComposeLogsProducer {
    compose: ComposeClient,
    tail: usize,
}

impl ComposeLogsProducer {
    pub fn new(compose: ComposeClient, tail: usize) -> Self {
        Self { compose, tail }
    }
}

#[async_trait]
impl Producer for ComposeLogsProducer {
    async fn produce(&self) -> Result<Option<Value>> {
        let logs = self
            .compose
            .logs(self.tail)
            .await
            .context("failed to read compose logs")?;

        Ok(Some(Value::String(logs)))
    }
}

/// Every container of the compose project with its state
pub struct ComposeStatusProducer {
    compose: ComposeClient,
}

impl ComposeStatusProducer {
    pub fn new(compose: ComposeClient) -> Self {
        Self { compose }
    }
}

#[async_trait]
impl Producer for ComposeStatusProducer {
    async fn produce(&self) -> Result<Option<Value>> {
        let containers = self
            .compose
            .ps()
            .await
            .context("failed to list compose services")?;

        Ok(Some(serde_json::to_value(containers)?))
    }
}
