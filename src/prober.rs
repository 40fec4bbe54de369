use futures::future::join_all;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::common::{Invocation, Worker};
use crate::error::CoordinatorError;
use crate::executor::{with_deadline, RemoteExecutor};
use crate::map_reduce_apps::PING_REPLY;

/// Liveness of every candidate worker, in candidate order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachabilityReport {
    pub statuses: Vec<(Worker, bool)>,
}

impl ReachabilityReport {
    pub fn reachable(&self) -> Vec<Worker> {
        self.statuses
            .iter()
            .filter(|(_, alive)| *alive)
            .map(|(worker, _)| worker.clone())
            .collect()
    }

    /// One `host: true|false` line per candidate.
    pub fn render(&self) -> String {
        let mut lines = String::new();
        for (worker, alive) in &self.statuses {
            lines.push_str(&format!("{}: {}\n", worker, alive));
        }
        lines
    }

    pub fn persist(&self, path: &Path) -> Result<(), CoordinatorError> {
        fs::write(path, self.render()).map_err(|source| CoordinatorError::StatusWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub struct Prober {
    executor: Arc<dyn RemoteExecutor>,
    timeout: Option<Duration>,
}

impl Prober {
    pub fn new(executor: Arc<dyn RemoteExecutor>, timeout: Option<Duration>) -> Self {
        Self { executor, timeout }
    }

    /// Pings every candidate at once and waits for all of them. Errors and
    /// timeouts count as unreachable; nothing is retried.
    pub async fn probe(&self, candidates: &[Worker]) -> ReachabilityReport {
        let probes = candidates.iter().map(|worker| async move {
            let alive = self.probe_one(worker).await;
            (worker.clone(), alive)
        });
        let statuses = join_all(probes).await;

        let live = statuses.iter().filter(|(_, alive)| *alive).count();
        info!("{} of {} candidate workers reachable", live, statuses.len());
        ReachabilityReport { statuses }
    }

    async fn probe_one(&self, worker: &Worker) -> bool {
        let ping = Invocation::ping();
        match with_deadline(self.executor.execute(worker, &ping), self.timeout).await {
            Ok(lines) if lines.first().map(String::as_str) == Some(PING_REPLY) => {
                debug!(worker = %worker, "reachable");
                true
            }
            Ok(lines) => {
                warn!(worker = %worker, "unexpected ping reply {:?}", lines);
                false
            }
            Err(failure) => {
                warn!(worker = %worker, "unreachable: {}", failure);
                false
            }
        }
    }
}

/// Candidate workers from a hosts file: one per line, `#` comments and blank
/// lines ignored, first occurrence of a duplicate wins.
pub fn load_candidates(path: &Path) -> Result<Vec<Worker>, CoordinatorError> {
    let contents = fs::read_to_string(path).map_err(|source| CoordinatorError::HostsRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_candidates(&contents))
}

pub fn parse_candidates(contents: &str) -> Vec<Worker> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for line in contents.lines() {
        let host = line.trim();
        if host.is_empty() || host.starts_with('#') {
            continue;
        }
        if !seen.insert(host.to_string()) {
            warn!("duplicate worker {} ignored", host);
            continue;
        }
        candidates.push(Worker::new(host));
    }
    candidates
}
