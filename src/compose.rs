//! Thin wrapper around the `docker compose` command line
//!
//! Every invocation is bounded by a timeout; the child process is killed if
//! the timeout elapses.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, trace, warn};

use crate::actions::ActionName;
use crate::config::Config;

/// Errors that can occur while invoking compose
#[derive(Debug, Error)]
pub enum ComposeError {
    /// No program configured
    #[error("compose command is empty")]
    EmptyCommand,

    /// The program could not be started
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish in time
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The command exited unsuccessfully
    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// One container as reported by `docker compose ps --format json`
///
/// Only the fields needed for precondition checks are typed; everything else
/// is kept verbatim so it can be forwarded to clients unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    #[serde(rename = "Service", default)]
    pub service: String,

    #[serde(rename = "State", default)]
    pub state: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parse the output of `ps --format json`
///
/// Newer compose versions print one JSON object per line, older ones a single
/// JSON array. Lines that fail to parse are skipped.
pub fn parse_ps_output(output: &str) -> Vec<ContainerStatus> {
    let output = output.trim();

    if output.starts_with('[') {
        return serde_json::from_str(output)
            .inspect_err(|e| warn!("failed to parse compose ps output: {e}"))
            .unwrap_or_default();
    }

    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            serde_json::from_str(line)
                .inspect_err(|e| trace!("skipping unparsable ps line: {e}"))
                .ok()
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ComposeClient {
    command: Vec<String>,
    compose_file: PathBuf,
    timeout: Duration,
}

impl ComposeClient {
    pub fn new(
        command: Vec<String>,
        compose_file: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            command,
            compose_file: compose_file.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.compose_command.clone(),
            config.compose_file.clone(),
            Duration::from_secs(config.command_timeout_secs),
        )
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    /// Run a compose subcommand and return its stdout
    #[instrument(skip(self))]
    async fn run(&self, args: &[&str]) -> Result<String, ComposeError> {
        let (program, base_args) = self
            .command
            .split_first()
            .ok_or(ComposeError::EmptyCommand)?;

        let rendered = format!(
            "{} -f {} {}",
            self.command.join(" "),
            self.compose_file.display(),
            args.join(" ")
        );
        trace!("running {rendered}");

        let child = Command::new(program)
            .args(base_args)
            .arg("-f")
            .arg(&self.compose_file)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ComposeError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ComposeError::Timeout {
                command: rendered.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| ComposeError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ComposeError::Failed {
                command: rendered,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// List all containers of the project, including stopped ones
    pub async fn ps(&self) -> Result<Vec<ContainerStatus>, ComposeError> {
        let output = self.run(&["ps", "--all", "--format", "json"]).await?;
        Ok(parse_ps_output(&output))
    }

    /// Current state of `service` (`running`, `exited`, ...), `None` if unknown
    pub async fn service_state(&self, service: &str) -> Result<Option<String>, ComposeError> {
        let containers = self.ps().await?;
        Ok(containers
            .into_iter()
            .find(|container| container.service == service)
            .map(|container| container.state))
    }

    /// The last `tail` lines of the project's logs
    pub async fn logs(&self, tail: usize) -> Result<String, ComposeError> {
        let tail = format!("--tail={tail}");
        self.run(&["logs", "--no-color", &tail]).await
    }

    /// Start, stop or restart a single service
    pub async fn apply(&self, action: ActionName, service: &str) -> Result<(), ComposeError> {
        debug!("{action} {service}");
        self.run(&[action.as_str(), service]).await.map(|_| ())
    }
}
