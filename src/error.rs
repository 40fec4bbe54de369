//! Error types for the coordinator and the worker-side handlers.
//!
//! Run-aborting conditions are [`CoordinatorError`]s. Everything that goes
//! wrong inside a single task is a [`TaskFailure`] and only ever drops that
//! task's contribution.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Conditions that abort a whole coordinator run.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to read worker list {}", path.display())]
    HostsRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read input corpus {}", path.display())]
    CorpusRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write reachability status to {}", path.display())]
    StatusWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to persist split artifact")]
    Split(#[source] StorageError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures of the shared artifact store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid artifact name {0:?}")]
    InvalidName(String),

    #[error("artifact {name} does not exist")]
    NotFound { name: String },

    #[error("failed to read artifact {name}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write artifact {name}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Failures raised by the worker-side operation handlers.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("unknown operation {0:?}")]
    UnknownOperation(String),

    #[error("malformed record {line:?} in artifact {artifact}")]
    MalformedRecord { artifact: String, line: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why a single task produced no usable output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskFailure {
    #[error("failed to start task: {0}")]
    Spawn(String),

    #[error("task exited with status {code:?}")]
    Exit { code: Option<i32> },

    #[error("I/O error while running task: {0}")]
    Io(String),

    #[error("task exceeded its {0:?} deadline")]
    TimedOut(Duration),

    #[error("task execution context was lost")]
    Lost,

    #[error("malformed task output line {0:?}")]
    Malformed(String),

    #[error("task handler failed: {0}")]
    Handler(String),
}
