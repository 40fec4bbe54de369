use tracing::{info, warn};

use super::worker_pool::{DispatchReport, WorkerPool};
use crate::common::{result_artifact_name, Invocation, KeyIndex, ReduceTask};
use crate::error::TaskFailure;
use crate::ranking::KeyCount;

#[derive(Debug, Clone, Default)]
pub struct ReduceStageOutput {
    pub tasks: Vec<ReduceTask>,
    /// Consolidated `key:count` results, worker by worker
    pub results: Vec<KeyCount>,
    pub waves: usize,
    pub failed_tasks: usize,
}

pub struct ReduceStage<'a> {
    pool: &'a WorkerPool,
}

impl<'a> ReduceStage<'a> {
    pub fn new(pool: &'a WorkerPool) -> Self {
        Self { pool }
    }

    /// Dispatches one reduce task per key over the same pool that ran the
    /// map stage. Tasks are not placed near the artifacts they read.
    pub async fn run(&self, key_index: &KeyIndex) -> ReduceStageOutput {
        let tasks = plan_reduce_tasks(key_index);
        info!(
            "shuffle/reduce of {} keys on {} workers",
            tasks.len(),
            self.pool.workers().len()
        );
        let invocations = tasks.iter().map(Invocation::shuffle_reduce).collect();
        let report = self.pool.dispatch(invocations).await;

        let mut output = consolidate(&report);
        output.tasks = tasks;
        output
    }
}

/// One task per non-empty key. Result artifact names come from a running
/// counter, not from the key.
pub fn plan_reduce_tasks(key_index: &KeyIndex) -> Vec<ReduceTask> {
    key_index
        .iter()
        .filter(|(key, sources)| !key.is_empty() && !sources.is_empty())
        .enumerate()
        .map(|(seq, (key, sources))| ReduceTask {
            key: key.clone(),
            result_artifact: result_artifact_name(seq),
            sources: sources.iter().cloned().collect(),
        })
        .collect()
}

/// Collects every successful result line. Each key has exactly one task, so
/// nothing needs deduplicating.
pub fn consolidate(report: &DispatchReport) -> ReduceStageOutput {
    let mut output = ReduceStageOutput {
        waves: report.wave_count(),
        failed_tasks: report.failures().count(),
        ..ReduceStageOutput::default()
    };

    for (worker, tasks) in report.successes_by_worker() {
        for task in tasks {
            let Ok(lines) = &task.outcome else { continue };
            let parsed: Result<Vec<KeyCount>, _> = lines
                .iter()
                .map(|line| {
                    line.parse::<KeyCount>()
                        .map_err(|_| TaskFailure::Malformed(line.clone()))
                })
                .collect();
            match parsed {
                Ok(counts) => output.results.extend(counts),
                Err(failure) => {
                    warn!(worker = %worker, task = task.task, "dropping reduce output: {}", failure);
                    output.failed_tasks += 1;
                }
            }
        }
    }

    info!(
        "shuffle/reduce produced {} counts ({} failed tasks)",
        output.results.len(),
        output.failed_tasks
    );
    output
}
