//! The "run this operation on that worker" contract.
//!
//! Task execution is opaque to the coordinator: it hands an [`Invocation`]
//! to a [`RemoteExecutor`] and gets back the output lines or a
//! [`TaskFailure`]. How the operation actually runs is up to the executor.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::path::{self, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::common::{Invocation, TaskOutput, Worker};
use crate::config::{CoordinatorConfig, Transport};
use crate::error::TaskFailure;
use crate::map_reduce_apps::WordCount;
use crate::storage::ArtifactStore;

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, worker: &Worker, invocation: &Invocation) -> TaskOutput;
}

/// Awaits `task`, turning an overrun of `deadline` into [`TaskFailure::TimedOut`].
pub async fn with_deadline<F>(task: F, deadline: Option<Duration>) -> TaskOutput
where
    F: Future<Output = TaskOutput>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(output) => output,
            Err(_) => Err(TaskFailure::TimedOut(limit)),
        },
        None => task.await,
    }
}

/// Runs the worker program as a child process, locally or through ssh.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    transport: Transport,
    ssh_program: String,
    worker_program: PathBuf,
    worker_args: Vec<String>,
    store_root: PathBuf,
}

impl ProcessExecutor {
    /// A relative `artifact_dir` is resolved against the coordinator's
    /// working directory: a remote worker would otherwise resolve it against
    /// its own login directory.
    pub fn from_config(config: &CoordinatorConfig, worker_program: PathBuf) -> io::Result<Self> {
        Ok(Self {
            transport: config.transport,
            ssh_program: config.ssh_program.clone(),
            worker_program: config.worker_program.clone().unwrap_or(worker_program),
            worker_args: config.worker_args.clone(),
            store_root: path::absolute(&config.artifact_dir)?,
        })
    }

    /// Program and arguments for `invocation` on `worker`.
    pub fn command_line(&self, worker: &Worker, invocation: &Invocation) -> (String, Vec<String>) {
        let mut remote = vec![self.worker_program.display().to_string()];
        remote.extend(self.worker_args.iter().cloned());
        remote.push("--store".to_string());
        remote.push(self.store_root.display().to_string());
        remote.push("--".to_string());
        remote.push(invocation.operation.as_str().to_string());
        remote.extend(invocation.params.iter().cloned());

        match self.transport {
            Transport::Local => {
                let program = remote.remove(0);
                (program, remote)
            }
            Transport::Ssh => {
                // ssh joins its arguments into one shell command line
                let mut args = vec![worker.host().to_string()];
                args.extend(remote.iter().map(|arg| shell_quote(arg)));
                (self.ssh_program.clone(), args)
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for ProcessExecutor {
    async fn execute(&self, worker: &Worker, invocation: &Invocation) -> TaskOutput {
        let (program, args) = self.command_line(worker, invocation);
        debug!(worker = %worker, "task command: {} {:?}", program, args);

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TaskFailure::Spawn(format!("{}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TaskFailure::Io("worker stdout was not captured".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut output = Vec::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| TaskFailure::Io(e.to_string()))?
        {
            if !line.is_empty() {
                output.push(line);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| TaskFailure::Io(e.to_string()))?;
        if status.success() {
            Ok(output)
        } else {
            Err(TaskFailure::Exit {
                code: status.code(),
            })
        }
    }
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Runs the word-count handlers on a blocking thread of this process. Every
/// "worker" shares the one store.
pub struct InProcessExecutor {
    app: Arc<WordCount>,
    store: Arc<dyn ArtifactStore>,
}

impl InProcessExecutor {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            app: Arc::new(WordCount::new()),
            store,
        }
    }
}

#[async_trait]
impl RemoteExecutor for InProcessExecutor {
    async fn execute(&self, worker: &Worker, invocation: &Invocation) -> TaskOutput {
        debug!(worker = %worker, "in-process task: {}", invocation);
        let app = Arc::clone(&self.app);
        let store = Arc::clone(&self.store);
        let invocation = invocation.clone();
        tokio::task::spawn_blocking(move || {
            app.run(store.as_ref(), invocation.operation, &invocation.params)
        })
        .await
        .map_err(|_| TaskFailure::Lost)?
        .map_err(|e| TaskFailure::Handler(e.to_string()))
    }
}
