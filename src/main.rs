use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use mr_wordcount::common::Operation;
use mr_wordcount::config::{CoordinatorConfig, Transport};
use mr_wordcount::executor::{InProcessExecutor, ProcessExecutor, RemoteExecutor};
use mr_wordcount::map_reduce_apps::WordCount;
use mr_wordcount::mr_parallel::{Coordinator, RunInputs, RunOutcome};
use mr_wordcount::storage::{ArtifactStore, FsArtifactStore};

/// Word count over a pool of workers, in synchronous map and reduce waves
#[derive(Parser)]
#[command(name = "mr-wordcount")]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the workers, then count the words of the input corpus
    Coordinate {
        /// File listing one candidate worker host per line
        hosts: PathBuf,

        /// File to write the `host: true|false` reachability status to
        status: PathBuf,

        /// Input corpus
        input: PathBuf,

        /// Path to a TOML configuration file
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Shared artifact directory
        #[arg(long)]
        store: Option<PathBuf>,

        #[arg(long, value_enum)]
        transport: Option<Transport>,

        /// Per-task deadline in milliseconds (0 = none)
        #[arg(long)]
        task_timeout_ms: Option<u64>,

        /// Extra attempts for a failed task
        #[arg(long)]
        retries: Option<u32>,

        /// Run tasks inside this process instead of spawning workers
        #[arg(long)]
        in_process: bool,
    },
    /// Run a single PING, MAP or SHUFFLE_REDUCE operation
    Worker {
        /// Shared artifact directory
        #[arg(long, default_value = ".")]
        store: PathBuf,

        /// PING | MAP | SHUFFLE_REDUCE
        operation: String,

        params: Vec<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout is the result channel for both roles
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Coordinate {
            hosts,
            status,
            input,
            config,
            store,
            transport,
            task_timeout_ms,
            retries,
            in_process,
        } => {
            let mut config = match config {
                Some(path) => CoordinatorConfig::load(&path)?,
                None => CoordinatorConfig::default(),
            };
            if let Some(store) = store {
                config.artifact_dir = store;
            }
            if let Some(transport) = transport {
                config.transport = transport;
            }
            if let Some(ms) = task_timeout_ms {
                config.task_timeout_ms = ms;
            }
            if let Some(retries) = retries {
                config.retry.max_retries = retries;
            }
            config.validate()?;

            let inputs = RunInputs {
                hosts,
                status,
                corpus: input,
            };
            coordinate(config, inputs, in_process).await
        }
        Commands::Worker {
            store,
            operation,
            params,
        } => work(store, &operation, &params),
    }
}

async fn coordinate(
    config: CoordinatorConfig,
    inputs: RunInputs,
    in_process: bool,
) -> anyhow::Result<()> {
    let store: Arc<dyn ArtifactStore> = Arc::new(
        FsArtifactStore::create(&config.artifact_dir).with_context(|| {
            format!(
                "failed to prepare artifact directory {}",
                config.artifact_dir.display()
            )
        })?,
    );
    let executor: Arc<dyn RemoteExecutor> = if in_process {
        Arc::new(InProcessExecutor::new(Arc::clone(&store)))
    } else {
        let worker_program =
            std::env::current_exe().context("failed to locate the worker executable")?;
        Arc::new(
            ProcessExecutor::from_config(&config, worker_program).with_context(|| {
                format!(
                    "failed to resolve artifact directory {}",
                    config.artifact_dir.display()
                )
            })?,
        )
    };
    debug!("configuration: {:?}", config);

    let coordinator = Coordinator::new(config, executor, store);
    match coordinator.run(&inputs).await? {
        RunOutcome::NoUsableWorkers(_) => {
            warn!("No reachable worker hosts, see {}", inputs.status.display());
        }
        RunOutcome::Completed(summary) => {
            info!(
                "run {}: {} work units on {} workers, map {} waves ({} failed), \
                 shuffle/reduce {} tasks in {} waves ({} failed)",
                summary.run_id,
                summary.work_units,
                summary.reachable.len(),
                summary.map_waves,
                summary.map_failures,
                summary.reduce_tasks,
                summary.reduce_waves,
                summary.reduce_failures
            );
            for count in &summary.ranked {
                println!("{}", count);
            }
        }
    }
    Ok(())
}

fn work(store: PathBuf, operation: &str, params: &[String]) -> anyhow::Result<()> {
    let operation: Operation = operation.parse()?;
    let store = FsArtifactStore::new(store);
    let lines = WordCount::new()
        .run(&store, operation, params)
        .with_context(|| format!("{} {:?} failed", operation, params))?;
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}
