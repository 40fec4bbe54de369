//! Batch word count on a master/worker split, map, shuffle/reduce model.
//!
//! The coordinator probes its candidate workers, splits the corpus into one
//! artifact per line, and drives both stages through a [`WorkerPool`] that
//! runs tasks in synchronous waves of at most one task per worker.
//!
//! [`WorkerPool`]: mr_parallel::WorkerPool

pub mod common;
pub mod config;
pub mod error;
pub mod executor;
pub mod map_reduce_apps;
pub mod mr_parallel;
pub mod partitioner;
pub mod prober;
pub mod ranking;
pub mod storage;
