use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoordinatorError;

/// How the coordinator reaches a worker host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Spawn the worker program on this machine, whatever the host name
    #[default]
    Local,
    /// Run the worker program through `ssh <host>`
    Ssh,
}

/// What to do with a failed task before giving up on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first one (0 = drop on first failure)
    pub max_retries: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Per-task rules applied by the wave dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub task_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Root of the artifact store shared by the coordinator and every worker
    pub artifact_dir: PathBuf,
    /// Worker executable; the running binary when unset
    pub worker_program: Option<PathBuf>,
    /// Arguments placed between the worker program and `--store`
    pub worker_args: Vec<String>,
    pub transport: Transport,
    pub ssh_program: String,
    pub probe_timeout_ms: u64,
    /// 0 disables the per-task deadline
    pub task_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("."),
            worker_program: None,
            worker_args: vec!["worker".to_string()],
            transport: Transport::Local,
            ssh_program: "ssh".to_string(),
            probe_timeout_ms: 30_000,
            task_timeout_ms: 600_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn load(path: &Path) -> Result<Self, CoordinatorError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CoordinatorError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: CoordinatorConfig = toml::from_str(&contents).map_err(|e| {
            CoordinatorError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if let Some(program) = &self.worker_program {
            if program.as_os_str().is_empty() {
                return Err(CoordinatorError::Config(
                    "worker_program must not be empty".to_string(),
                ));
            }
        }
        if self.transport == Transport::Ssh && self.ssh_program.trim().is_empty() {
            return Err(CoordinatorError::Config(
                "ssh_program must not be empty with the ssh transport".to_string(),
            ));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        millis_or_unbounded(self.probe_timeout_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        millis_or_unbounded(self.task_timeout_ms)
    }

    pub fn execution_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            task_timeout: self.task_timeout(),
            retry: self.retry.clone(),
        }
    }
}

fn millis_or_unbounded(ms: u64) -> Option<Duration> {
    if ms > 0 {
        Some(Duration::from_millis(ms))
    } else {
        None
    }
}
