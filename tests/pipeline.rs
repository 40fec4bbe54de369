//! Whole-run properties of the coordinator, with workers running in-process
//! against a temporary shared store.

use async_trait::async_trait;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

use mr_wordcount::common::{Invocation, Operation, TaskOutput, Worker};
use mr_wordcount::config::CoordinatorConfig;
use mr_wordcount::error::TaskFailure;
use mr_wordcount::executor::{InProcessExecutor, RemoteExecutor};
use mr_wordcount::mr_parallel::{Coordinator, RunInputs, RunOutcome, RunSummary};
use mr_wordcount::ranking::KeyCount;
use mr_wordcount::storage::{ArtifactStore, FsArtifactStore};

/// In-process workers, except that the listed map splits always fail.
struct FailingSplits {
    inner: InProcessExecutor,
    failing: Vec<&'static str>,
}

#[async_trait]
impl RemoteExecutor for FailingSplits {
    async fn execute(&self, worker: &Worker, invocation: &Invocation) -> TaskOutput {
        let split = invocation.params.first().map(String::as_str);
        if invocation.operation == Operation::Map && split.is_some_and(|s| self.failing.contains(&s)) {
            return Err(TaskFailure::Exit { code: Some(1) });
        }
        self.inner.execute(worker, invocation).await
    }
}

struct Run {
    _dir: TempDir,
    inputs: RunInputs,
    store: Arc<dyn ArtifactStore>,
}

fn prepare(hosts: &[&str], corpus: &str) -> Run {
    let dir = TempDir::new().unwrap();
    let inputs = RunInputs {
        hosts: dir.path().join("hosts.txt"),
        status: dir.path().join("status.txt"),
        corpus: dir.path().join("input.txt"),
    };
    fs::write(&inputs.hosts, hosts.join("\n")).unwrap();
    fs::write(&inputs.corpus, corpus).unwrap();
    let store: Arc<dyn ArtifactStore> =
        Arc::new(FsArtifactStore::create(dir.path().join("shared")).unwrap());
    Run {
        _dir: dir,
        inputs,
        store,
    }
}

async fn complete(run: &Run, executor: Arc<dyn RemoteExecutor>) -> RunSummary {
    let coordinator = Coordinator::new(CoordinatorConfig::default(), executor, Arc::clone(&run.store));
    match coordinator.run(&run.inputs).await.unwrap() {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::NoUsableWorkers(_) => panic!("expected reachable workers"),
    }
}

fn sorted(mut counts: Vec<KeyCount>) -> Vec<KeyCount> {
    counts.sort();
    counts
}

#[tokio::test]
async fn test_repeated_word_counts_every_occurrence() {
    let corpus = "echo echo\n\necho\necho, echo. echo\n";
    let run = prepare(&["w0", "w1", "w2"], corpus);
    let executor = Arc::new(InProcessExecutor::new(Arc::clone(&run.store)));

    let summary = complete(&run, executor).await;

    assert_eq!(summary.ranked, vec![KeyCount::new("echo", 6)]);
    assert_eq!(summary.work_units, 3);
    assert_eq!(summary.reduce_tasks, 1);
}

#[tokio::test]
async fn test_waves_follow_pool_size() {
    let corpus = (0..7).map(|i| format!("line{} shared", i)).collect::<Vec<_>>().join("\n");
    let run = prepare(&["w0", "w1", "w2"], &corpus);
    let executor = Arc::new(InProcessExecutor::new(Arc::clone(&run.store)));

    let summary = complete(&run, executor).await;

    // 7 splits over 3 workers; 8 keys (line0..line6 + shared) over 3 workers
    assert_eq!(summary.map_waves, 3);
    assert_eq!(summary.reduce_tasks, 8);
    assert_eq!(summary.reduce_waves, 3);
    assert_eq!(summary.ranked[0], KeyCount::new("shared", 7));
}

#[tokio::test]
async fn test_rerun_yields_the_same_counts() {
    let corpus = "a b c a\nb a\n\nc c c d\n";
    let run = prepare(&["w0", "w1"], corpus);

    let first = complete(&run, Arc::new(InProcessExecutor::new(Arc::clone(&run.store)))).await;
    let second = complete(&run, Arc::new(InProcessExecutor::new(Arc::clone(&run.store)))).await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(sorted(first.ranked.clone()), sorted(second.ranked.clone()));
    assert_eq!(
        sorted(first.ranked),
        vec![
            KeyCount::new("a", 3),
            KeyCount::new("b", 2),
            KeyCount::new("c", 4),
            KeyCount::new("d", 1),
        ]
    );
}

#[tokio::test]
async fn test_failed_map_task_only_loses_its_own_words() {
    let corpus = "alpha common\nbeta common\ngamma common\n";
    let run = prepare(&["w0", "w1", "w2"], corpus);
    let executor = Arc::new(FailingSplits {
        inner: InProcessExecutor::new(Arc::clone(&run.store)),
        failing: vec!["S1"],
    });

    let summary = complete(&run, executor).await;

    assert_eq!(summary.map_failures, 1);
    assert_eq!(summary.reduce_failures, 0);
    assert_eq!(
        sorted(summary.ranked),
        vec![
            KeyCount::new("alpha", 1),
            KeyCount::new("common", 2),
            KeyCount::new("gamma", 1),
        ]
    );
}

#[tokio::test]
async fn test_keys_differing_in_case_count_spellings_in_their_own_sources() {
    let run = prepare(&["w0"], "The the\nTHE cat\n");
    let executor = Arc::new(InProcessExecutor::new(Arc::clone(&run.store)));

    let summary = complete(&run, executor).await;

    // keys are not normalised; each key only reads the map outputs it was
    // indexed under, matching records there case-insensitively
    assert_eq!(
        sorted(summary.ranked),
        vec![
            KeyCount::new("THE", 1),
            KeyCount::new("The", 2),
            KeyCount::new("cat", 1),
            KeyCount::new("the", 2),
        ]
    );
}

#[tokio::test]
async fn test_words_with_unicode_whitespace_keep_their_own_counts() {
    let run = prepare(&["w0"], "caf\u{a0} caf\u{a0}\ncaf\u{a0} caf\n");
    let executor = Arc::new(InProcessExecutor::new(Arc::clone(&run.store)));

    let summary = complete(&run, executor).await;

    assert_eq!(
        summary.ranked,
        vec![KeyCount::new("caf\u{a0}", 3), KeyCount::new("caf", 1)]
    );
}
