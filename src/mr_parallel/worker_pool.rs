use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::common::{Invocation, TaskOutput, Worker};
use crate::config::ExecutionPolicy;
use crate::error::TaskFailure;
use crate::executor::{with_deadline, RemoteExecutor};

/// One task placed on one worker for the length of a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub worker: usize,
    pub task: usize,
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: usize,
    pub worker: usize,
    pub wave: usize,
    pub attempts: u32,
    pub outcome: TaskOutput,
}

#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub workers: Vec<Worker>,
    /// Assignments of every wave, in wave order
    pub waves: Vec<Vec<Assignment>>,
    /// One report per task, in task order
    pub tasks: Vec<TaskReport>,
}

impl DispatchReport {
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.outcome.is_err())
    }

    /// Successful task reports grouped per worker (pool order), each group
    /// in wave order.
    pub fn successes_by_worker(&self) -> Vec<(&Worker, Vec<&TaskReport>)> {
        self.workers
            .iter()
            .enumerate()
            .map(|(index, worker)| {
                let mut done: Vec<_> = self
                    .tasks
                    .iter()
                    .filter(|t| t.worker == index && t.outcome.is_ok())
                    .collect();
                done.sort_by_key(|t| t.wave);
                (worker, done)
            })
            .collect()
    }

    /// Per worker, the concatenation of its successful outputs in wave order.
    pub fn lines_by_worker(&self) -> Vec<(&Worker, Vec<&str>)> {
        self.successes_by_worker()
            .into_iter()
            .map(|(worker, reports)| {
                let lines = reports
                    .into_iter()
                    .filter_map(|r| r.outcome.as_ref().ok())
                    .flatten()
                    .map(String::as_str)
                    .collect();
                (worker, lines)
            })
            .collect()
    }
}

/// Runs task lists over a fixed pool in synchronous waves: at most one task
/// per worker per wave, and every task of a wave finishes before the next
/// wave starts. Workers that failed stay in the pool.
pub struct WorkerPool {
    workers: Vec<Worker>,
    executor: Arc<dyn RemoteExecutor>,
    policy: ExecutionPolicy,
}

impl WorkerPool {
    /// # Panics
    ///
    /// Panics if `workers` is empty; a run without reachable workers stops
    /// before building a pool.
    pub fn new(
        workers: Vec<Worker>,
        executor: Arc<dyn RemoteExecutor>,
        policy: ExecutionPolicy,
    ) -> WorkerPool {
        assert!(!workers.is_empty());

        WorkerPool {
            workers,
            executor,
            policy,
        }
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub async fn dispatch(&self, tasks: Vec<Invocation>) -> DispatchReport {
        let size = self.workers.len();
        let mut waves = Vec::with_capacity(tasks.len().div_ceil(size));
        let mut reports = Vec::with_capacity(tasks.len());

        for (wave, chunk) in tasks.chunks(size).enumerate() {
            info!(wave, tasks = chunk.len(), "starting wave");
            let assignments: Vec<_> = (0..chunk.len())
                .map(|slot| Assignment {
                    worker: slot,
                    task: wave * size + slot,
                })
                .collect();

            let (sender, receiver) = async_channel::bounded(chunk.len());
            for (assignment, invocation) in assignments.iter().copied().zip(chunk) {
                let sender = sender.clone();
                let executor = Arc::clone(&self.executor);
                let worker = self.workers[assignment.worker].clone();
                let invocation = invocation.clone();
                let policy = self.policy.clone();
                tokio::spawn(async move {
                    let (attempts, outcome) =
                        run_task(executor.as_ref(), &worker, &invocation, &policy).await;
                    // the receiver outlives every sender of its wave
                    let _ = sender.send((assignment, attempts, outcome)).await;
                });
            }
            drop(sender);

            // Wave barrier: the channel closes once every task of the wave
            // has reported or died.
            let mut joined = Vec::with_capacity(chunk.len());
            while let Ok((assignment, attempts, outcome)) = receiver.recv().await {
                self.log_outcome(wave, assignment, &outcome);
                joined.push(TaskReport {
                    task: assignment.task,
                    worker: assignment.worker,
                    wave,
                    attempts,
                    outcome,
                });
            }
            for assignment in &assignments {
                if !joined.iter().any(|r| r.task == assignment.task) {
                    let outcome = Err(TaskFailure::Lost);
                    self.log_outcome(wave, *assignment, &outcome);
                    joined.push(TaskReport {
                        task: assignment.task,
                        worker: assignment.worker,
                        wave,
                        attempts: 1,
                        outcome,
                    });
                }
            }

            debug!(wave, "wave joined");
            reports.extend(joined);
            waves.push(assignments);
        }

        reports.sort_by_key(|r| r.task);
        DispatchReport {
            workers: self.workers.clone(),
            waves,
            tasks: reports,
        }
    }

    fn log_outcome(&self, wave: usize, assignment: Assignment, outcome: &TaskOutput) {
        let worker = &self.workers[assignment.worker];
        match outcome {
            Ok(lines) => info!(
                wave,
                task = assignment.task,
                worker = %worker,
                "completed successfully ({} lines)",
                lines.len()
            ),
            Err(failure) => warn!(
                wave,
                task = assignment.task,
                worker = %worker,
                "failed: {}",
                failure
            ),
        }
    }
}

/// Runs one task on one worker, retrying in place per `policy`.
async fn run_task(
    executor: &dyn RemoteExecutor,
    worker: &Worker,
    invocation: &Invocation,
    policy: &ExecutionPolicy,
) -> (u32, TaskOutput) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = with_deadline(executor.execute(worker, invocation), policy.task_timeout).await;
        match outcome {
            Err(failure) if attempt <= policy.retry.max_retries => {
                let delay = policy.retry.delay_for(attempt);
                warn!(
                    worker = %worker,
                    attempt,
                    "{} failed ({}), retrying in {:?}",
                    invocation.operation,
                    failure,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            outcome => return (attempt, outcome),
        }
    }
}
