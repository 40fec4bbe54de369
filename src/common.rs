use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{TaskFailure, WorkerError};

const SPLIT_PREFIX: &str = "S";
const UNSORTED_MAP_PREFIX: &str = "UM";
const REDUCED_MAP_PREFIX: &str = "RM";
const MATCHED_RECORDS_PREFIX: &str = "SM";

/// {word: names of the intermediate artifacts holding at least one record of it}
pub type KeyIndex = BTreeMap<String, BTreeSet<String>>;

/// Output lines of a task, or why there are none.
pub type TaskOutput = Result<Vec<String>, TaskFailure>;

/// A reachable execution target, addressed by host name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Worker {
    host: String,
}

impl Worker {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ping,
    Map,
    ShuffleReduce,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Ping => "PING",
            Operation::Map => "MAP",
            Operation::ShuffleReduce => "SHUFFLE_REDUCE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PING" => Ok(Operation::Ping),
            "MAP" => Ok(Operation::Map),
            "SHUFFLE_REDUCE" => Ok(Operation::ShuffleReduce),
            other => Err(WorkerError::UnknownOperation(other.to_string())),
        }
    }
}

/// An operation plus its ordered parameters, ready to run on some worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub operation: Operation,
    pub params: Vec<String>,
}

impl Invocation {
    pub fn ping() -> Self {
        Self {
            operation: Operation::Ping,
            params: Vec::new(),
        }
    }

    pub fn map(unit: &WorkUnit) -> Self {
        Self {
            operation: Operation::Map,
            params: vec![unit.artifact.clone()],
        }
    }

    pub fn shuffle_reduce(task: &ReduceTask) -> Self {
        let mut params = Vec::with_capacity(task.sources.len() + 2);
        params.push(task.key.clone());
        params.push(task.result_artifact.clone());
        params.extend(task.sources.iter().cloned());
        Self {
            operation: Operation::ShuffleReduce,
            params,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        for param in &self.params {
            write!(f, " {}", param)?;
        }
        Ok(())
    }
}

/// One non-blank line of the corpus, persisted as its own split artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub id: usize,
    pub artifact: String,
}

impl WorkUnit {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            artifact: split_artifact_name(id),
        }
    }
}

/// Aggregation of one key over every intermediate artifact that mentions it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceTask {
    pub key: String,
    pub result_artifact: String,
    pub sources: Vec<String>,
}

pub fn split_artifact_name(id: usize) -> String {
    format!("{}{}", SPLIT_PREFIX, id)
}

pub fn result_artifact_name(seq: usize) -> String {
    format!("{}{}", REDUCED_MAP_PREFIX, seq)
}

/// `S<n>` -> `UM<n>`
pub fn intermediate_artifact_name(split: &str) -> Option<String> {
    split
        .strip_prefix(SPLIT_PREFIX)
        .filter(|suffix| !suffix.is_empty())
        .map(|suffix| format!("{}{}", UNSORTED_MAP_PREFIX, suffix))
}

/// `RM<n>` -> `SM<n>`. Swapping the whole `RM` prefix for `S` would land on
/// the split artifact of the same number, so only the leading `R` changes.
pub fn matched_records_name(result: &str) -> Option<String> {
    result
        .strip_prefix(REDUCED_MAP_PREFIX)
        .filter(|suffix| !suffix.is_empty())
        .map(|suffix| format!("{}{}", MATCHED_RECORDS_PREFIX, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names_follow_prefix_convention() {
        assert_eq!(split_artifact_name(7), "S7");
        assert_eq!(result_artifact_name(0), "RM0");
        assert_eq!(intermediate_artifact_name("S12").as_deref(), Some("UM12"));
        assert_eq!(matched_records_name("RM3").as_deref(), Some("SM3"));
    }

    #[test]
    fn test_derived_names_reject_foreign_prefixes() {
        assert_eq!(intermediate_artifact_name("UM1"), None);
        assert_eq!(intermediate_artifact_name("S"), None);
        assert_eq!(matched_records_name("S3"), None);
    }

    #[test]
    fn test_operation_parses_wire_names() {
        assert_eq!("PING".parse::<Operation>().unwrap(), Operation::Ping);
        assert_eq!(
            "SHUFFLE_REDUCE".parse::<Operation>().unwrap(),
            Operation::ShuffleReduce
        );
        assert!(matches!(
            "map".parse::<Operation>(),
            Err(WorkerError::UnknownOperation(op)) if op == "map"
        ));
    }

    #[test]
    fn test_shuffle_reduce_invocation_orders_params() {
        let task = ReduceTask {
            key: "cat".to_string(),
            result_artifact: "RM4".to_string(),
            sources: vec!["UM0".to_string(), "UM2".to_string()],
        };
        let invocation = Invocation::shuffle_reduce(&task);
        assert_eq!(invocation.operation, Operation::ShuffleReduce);
        assert_eq!(invocation.params, vec!["cat", "RM4", "UM0", "UM2"]);
        assert_eq!(invocation.to_string(), "SHUFFLE_REDUCE cat RM4 UM0 UM2");
    }
}
