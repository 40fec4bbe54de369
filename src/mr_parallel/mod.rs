//! Coordinator-side machinery: the wave-based worker pool and the two
//! stages that run on it.

mod coordinator;
mod map_stage;
mod reduce_stage;
mod worker_pool;

pub use coordinator::{Coordinator, RunInputs, RunOutcome, RunSummary};
pub use map_stage::{MapStage, MapStageOutput};
pub use reduce_stage::{plan_reduce_tasks, ReduceStage, ReduceStageOutput};
pub use worker_pool::{Assignment, DispatchReport, TaskReport, WorkerPool};
