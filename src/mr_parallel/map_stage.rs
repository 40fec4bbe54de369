use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::worker_pool::{DispatchReport, WorkerPool};
use crate::common::{Invocation, KeyIndex, WorkUnit, Worker};
use crate::error::TaskFailure;

/// What the map stage hands to the shuffle/reduce stage.
#[derive(Debug, Clone, Default)]
pub struct MapStageOutput {
    pub key_index: KeyIndex,
    /// {intermediate artifact: worker that produced it}
    pub artifact_owners: BTreeMap<String, Worker>,
    pub waves: usize,
    pub failed_tasks: usize,
}

pub struct MapStage<'a> {
    pool: &'a WorkerPool,
}

impl<'a> MapStage<'a> {
    pub fn new(pool: &'a WorkerPool) -> Self {
        Self { pool }
    }

    pub async fn run(&self, units: &[WorkUnit]) -> MapStageOutput {
        info!(
            "mapping {} split artifacts on {} workers",
            units.len(),
            self.pool.workers().len()
        );
        let tasks = units.iter().map(Invocation::map).collect();
        let report = self.pool.dispatch(tasks).await;
        consolidate(&report)
    }
}

/// Folds every worker's `word:artifact` lines into the key index. A task
/// whose output does not parse contributes nothing.
pub fn consolidate(report: &DispatchReport) -> MapStageOutput {
    let mut output = MapStageOutput {
        waves: report.wave_count(),
        failed_tasks: report.failures().count(),
        ..MapStageOutput::default()
    };

    for (worker, tasks) in report.successes_by_worker() {
        for task in tasks {
            let Ok(lines) = &task.outcome else { continue };
            let pairs = match parse_map_output(lines) {
                Ok(pairs) => pairs,
                Err(failure) => {
                    warn!(worker = %worker, task = task.task, "dropping map output: {}", failure);
                    output.failed_tasks += 1;
                    continue;
                }
            };
            for (word, artifact) in pairs {
                output
                    .artifact_owners
                    .insert(artifact.to_string(), worker.clone());
                if word.is_empty() {
                    debug!("skipping empty key from {}", artifact);
                    continue;
                }
                output
                    .key_index
                    .entry(word.to_string())
                    .or_default()
                    .insert(artifact.to_string());
            }
        }
    }

    info!(
        "map stage produced {} distinct keys over {} intermediate artifacts",
        output.key_index.len(),
        output.artifact_owners.len()
    );
    output
}

/// `word:artifact` per line, split at the last colon.
pub fn parse_map_output(lines: &[String]) -> Result<Vec<(&str, &str)>, TaskFailure> {
    lines
        .iter()
        .map(|line| match line.rsplit_once(':') {
            Some((word, artifact)) if !artifact.is_empty() => Ok((word, artifact)),
            _ => Err(TaskFailure::Malformed(line.clone())),
        })
        .collect()
}
