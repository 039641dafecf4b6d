use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

use crate::topic::Topic;
use crate::util::{get_addr, get_compose_path, get_port};

const DEFAULT_INTERVAL_SECS: u64 = 3;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Address both the control and the telemetry endpoint listen on
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    /// Program and leading arguments used to invoke compose
    #[serde(default = "default_compose_command")]
    pub compose_command: Vec<String>,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Number of log lines published on the `logs` topic
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,

    #[serde(default = "default_interval")]
    pub collect_interval_secs: u64,

    #[serde(default = "default_interval")]
    pub dispatch_interval_secs: u64,

    /// Minimum seconds between two polls, per topic
    #[serde(default)]
    pub intervals: HashMap<Topic, u64>,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_compose_command() -> Vec<String> {
    vec!["docker".to_string(), "compose".to_string()]
}

fn default_command_timeout() -> u64 {
    120
}

fn default_log_tail() -> usize {
    1000
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_enable_cors() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            compose_file: default_compose_file(),
            compose_command: default_compose_command(),
            command_timeout_secs: default_command_timeout(),
            log_tail: default_log_tail(),
            collect_interval_secs: default_interval(),
            dispatch_interval_secs: default_interval(),
            intervals: HashMap::new(),
            enable_cors: default_enable_cors(),
        }
    }
}

impl Config {
    /// Minimum time between two polls of `topic`
    pub fn interval(&self, topic: Topic) -> Duration {
        Duration::from_secs(
            self.intervals
                .get(&topic)
                .copied()
                .unwrap_or(DEFAULT_INTERVAL_SECS),
        )
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs)
    }

    /// Override values from `AGENT_ADDR`, `AGENT_PORT` and `COMPOSE_PATH`
    pub fn apply_env(&mut self) {
        if let Some(addr) = get_addr() {
            self.bind.set_ip(addr);
        }
        if let Some(port) = get_port() {
            self.bind.set_port(port);
        }
        if let Some(path) = get_compose_path() {
            self.compose_file = path;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.compose_command.is_empty() {
            bail!("compose_command must not be empty");
        }
        if self.collect_interval_secs == 0 || self.dispatch_interval_secs == 0 {
            bail!("loop intervals must be at least one second");
        }
        if let Some((topic, _)) = self.intervals.iter().find(|(_, secs)| **secs == 0) {
            bail!("interval for {topic} must be at least one second");
        }
        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// Read the config file (if any), apply environment overrides and validate
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}
