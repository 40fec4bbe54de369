use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::map_stage::MapStage;
use super::reduce_stage::ReduceStage;
use super::worker_pool::WorkerPool;
use crate::common::Worker;
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::executor::RemoteExecutor;
use crate::partitioner::{partition_corpus, read_corpus};
use crate::prober::{load_candidates, Prober, ReachabilityReport};
use crate::ranking::{rank, KeyCount};
use crate::storage::ArtifactStore;

/// Files a run reads and writes outside the artifact store.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub hosts: PathBuf,
    pub status: PathBuf,
    pub corpus: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub reachable: Vec<Worker>,
    pub work_units: usize,
    pub map_waves: usize,
    pub map_failures: usize,
    pub artifact_owners: BTreeMap<String, Worker>,
    pub reduce_tasks: usize,
    pub reduce_waves: usize,
    pub reduce_failures: usize,
    pub ranked: Vec<KeyCount>,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every candidate failed its probe; nothing else was done.
    NoUsableWorkers(ReachabilityReport),
    Completed(RunSummary),
}

pub struct Coordinator {
    config: CoordinatorConfig,
    executor: Arc<dyn RemoteExecutor>,
    store: Arc<dyn ArtifactStore>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            config,
            executor,
            store,
        }
    }

    /// probe -> split -> map -> shuffle/reduce -> rank. Only I/O on the
    /// hosts, status and corpus files aborts the run; task failures just
    /// drop their contribution.
    pub async fn run(&self, inputs: &RunInputs) -> Result<RunOutcome, CoordinatorError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "pinging workers");
        let candidates = load_candidates(&inputs.hosts)?;
        let prober = Prober::new(Arc::clone(&self.executor), self.config.probe_timeout());
        let reachability = prober.probe(&candidates).await;
        reachability.persist(&inputs.status)?;

        let reachable = reachability.reachable();
        if reachable.is_empty() {
            warn!(%run_id, "no reachable workers");
            return Ok(RunOutcome::NoUsableWorkers(reachability));
        }

        info!(%run_id, "splitting input corpus {}", inputs.corpus.display());
        let corpus = read_corpus(&inputs.corpus)?;
        let units = partition_corpus(&corpus, self.store.as_ref())?;

        let pool = WorkerPool::new(
            reachable.clone(),
            Arc::clone(&self.executor),
            self.config.execution_policy(),
        );

        info!(%run_id, "mapping split artifacts");
        let mapped = MapStage::new(&pool).run(&units).await;

        info!(%run_id, "shuffle/reduce of unsorted map artifacts");
        let reduced = ReduceStage::new(&pool).run(&mapped.key_index).await;

        let ranked = rank(reduced.results);
        info!(%run_id, "ranked {} keys", ranked.len());

        Ok(RunOutcome::Completed(RunSummary {
            run_id,
            reachable,
            work_units: units.len(),
            map_waves: mapped.waves,
            map_failures: mapped.failed_tasks,
            artifact_owners: mapped.artifact_owners,
            reduce_tasks: reduced.tasks.len(),
            reduce_waves: reduced.waves,
            reduce_failures: reduced.failed_tasks,
            ranked,
        }))
    }
}
