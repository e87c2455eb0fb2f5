//! Integration tests for the worker pool driving real OS processes.
//!
//! A small shell script stands in for the simulator: it honors the real
//! flag set (-r, -c, -o, -S, -s, -m, -p) and writes a tabular output with
//! the simulator's column vocabulary.

use std::path::{Path, PathBuf};

use abcpool_kernel::patterns::RuleSet;
use abcpool_kernel::pool::{group_by_tag, run_workers, run_workers_instrumented};
use abcpool_kernel::sim::SimulationTask;
use abcpool_kernel::stats::summarize_columns;
use abcpool_kernel::tempfs::TempFileSystem;
use abcpool_kernel::worker::{CommandLine, Task, Worker, WorkerIdGen};
use abcpool_kernel::{Error, JobSpec, OutputSchema, Result, merge_projected_files};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;

// ============================================================================
// Test Helpers
// ============================================================================

const FAKE_SIMULATOR: &str = r#"#!/bin/sh
reps=0; out=""; seed=0
while [ $# -gt 0 ]; do
    case "$1" in
        -r) reps=$2; shift 2 ;;
        -c) shift 2 ;;
        -o) out=$2; shift 2 ;;
        -S) seed=$2; shift 2 ;;
        -s|-m) shift 2 ;;
        *) shift ;;
    esac
done
printf 'PRI.t.1\tPRI.t.2\tpi.1\twattTheta.1\tPRI.numTauClass\n' > "$out"
i=0
while [ $i -lt "$reps" ]; do
    printf '0.1\t0.2\t0.01\t0.02\t0\n' >> "$out"
    i=$((i + 1))
done
"#;

fn install_fake_simulator(temp_fs: &TempFileSystem) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = temp_fs.base_dir().join("fake-simulator.sh");
    std::fs::write(&path, FAKE_SIMULATOR).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn temp_fs() -> TempFileSystem {
    TempFileSystem::new(&std::env::temp_dir(), "abcpool-pool-test-", false).unwrap()
}

fn sim_workers(
    temp_fs: &TempFileSystem,
    exe: &Path,
    batches: &[(usize, u64)],
) -> Vec<Worker<SimulationTask>> {
    let ids = WorkerIdGen::new();
    let mut rng = StdRng::seed_from_u64(1234);
    batches
        .iter()
        .map(|&(tag, reps)| {
            let spec = JobSpec::new(exe, "model.cfg", reps)
                .schema(OutputSchema::Regression)
                .tag(tag);
            let task = SimulationTask::new(
                spec,
                RuleSet::simulator_defaults().unwrap(),
                temp_fs,
                &mut rng,
            )
            .unwrap();
            Worker::new(&ids, tag, task)
        })
        .collect()
}

// ============================================================================
// End-to-End Pipeline
// ============================================================================

#[tokio::test]
async fn simulate_project_merge_summarize() {
    let fs = temp_fs();
    let exe = install_fake_simulator(&fs);

    let workers = sim_workers(&fs, &exe, &[(0, 5), (0, 5), (0, 5)]);
    let done = run_workers(workers, 2).await.unwrap();
    assert_eq!(done.len(), 3);

    for worker in &done {
        assert!(worker.finished());
        assert_eq!(worker.exit_code(), Some(0));
        // finalize parsed the companion artifact into typed form
        assert_eq!(
            worker.task.header(),
            ["PRI.t.1", "PRI.t.2", "pi.1", "wattTheta.1"]
        );
        assert_eq!(worker.task.parameter_indices(), [0, 1]);
        assert_eq!(worker.task.stat_indices(), [2, 3]);
    }

    let groups = group_by_tag(done);
    let inputs: Vec<PathBuf> = groups[&0]
        .iter()
        .map(|w| w.task.output_path().to_path_buf())
        .collect();
    let merged = fs.base_dir().join("merged.txt");
    let rows = merge_projected_files(&inputs, &merged, true, 15)
        .await
        .unwrap();
    assert_eq!(rows, 15);

    let summaries = summarize_columns(&merged, '\t').await.unwrap();
    assert_eq!(summaries.len(), 4);
    assert_eq!(summaries[0].name(), "PRI.t.1");
    assert_eq!(summaries[0].n(), 15);
    assert!((summaries[2].mean().unwrap() - 0.01).abs() < 1e-12);
}

#[tokio::test]
async fn merge_with_wrong_expectation_aborts() {
    let fs = temp_fs();
    let exe = install_fake_simulator(&fs);

    let workers = sim_workers(&fs, &exe, &[(0, 5), (0, 5)]);
    let done = run_workers(workers, 2).await.unwrap();
    let inputs: Vec<PathBuf> = done
        .iter()
        .map(|w| w.task.output_path().to_path_buf())
        .collect();
    let merged = fs.base_dir().join("merged.txt");
    let err = merge_projected_files(&inputs, &merged, true, 20)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CountMismatch { .. }));
}

// ============================================================================
// Concurrency Bound
// ============================================================================

struct SleepTask {
    seconds: f64,
}

#[async_trait]
impl Task for SleepTask {
    fn kind(&self) -> &str {
        "sleep"
    }

    fn command(&self) -> CommandLine {
        CommandLine::new("/bin/sh")
            .arg("-c")
            .arg(format!("sleep {}", self.seconds))
    }
}

#[tokio::test]
async fn never_exceeds_max_parallel() {
    let ids = WorkerIdGen::new();
    let workers: Vec<Worker<SleepTask>> = (0..6)
        .map(|_| Worker::new(&ids, 0, SleepTask { seconds: 0.2 }))
        .collect();
    let run = run_workers_instrumented(workers, 2).await.unwrap();
    assert_eq!(run.workers.len(), 6);
    assert!(run.peak_active <= 2, "peak was {}", run.peak_active);
    assert!(run.peak_active >= 1);
}

#[tokio::test]
async fn freed_slot_admits_next_worker() {
    // One slow and several fast workers with two slots: if slots freed
    // per-completion (rather than per-batch), total wall time stays well
    // under the serialized sum.
    let ids = WorkerIdGen::new();
    let mut workers = vec![Worker::new(&ids, 0, SleepTask { seconds: 0.5 })];
    for _ in 0..4 {
        workers.push(Worker::new(&ids, 0, SleepTask { seconds: 0.05 }));
    }
    let start = std::time::Instant::now();
    let done = run_workers(workers, 2).await.unwrap();
    let elapsed = start.elapsed();
    assert_eq!(done.len(), 5);
    // Serialized: 0.7s. Batched by pairs: >= 0.6s. Slot-per-completion
    // keeps the fast four on the second slot while the slow one runs.
    assert!(
        elapsed < std::time::Duration::from_millis(600),
        "took {elapsed:?}"
    );
}

// ============================================================================
// Failure Propagation
// ============================================================================

struct TouchTask {
    marker: PathBuf,
    seconds: f64,
}

#[async_trait]
impl Task for TouchTask {
    fn kind(&self) -> &str {
        "touch"
    }

    fn command(&self) -> CommandLine {
        CommandLine::new("/bin/sh").arg("-c").arg(format!(
            "sleep {}; touch {}",
            self.seconds,
            self.marker.display()
        ))
    }
}

struct ExitTask {
    code: i32,
}

#[async_trait]
impl Task for ExitTask {
    fn kind(&self) -> &str {
        "exit"
    }

    fn command(&self) -> CommandLine {
        CommandLine::new("/bin/sh")
            .arg("-c")
            .arg(format!("echo failing >&2; exit {}", self.code))
    }
}

#[tokio::test]
async fn failure_surfaces_after_draining_siblings() {
    let fs = temp_fs();
    let ids = WorkerIdGen::new();

    let markers: Vec<PathBuf> = (0..3)
        .map(|i| fs.base_dir().join(format!("marker-{i}")))
        .collect();

    enum Mixed {
        Fail(ExitTask),
        Touch(TouchTask),
    }

    #[async_trait]
    impl Task for Mixed {
        fn kind(&self) -> &str {
            match self {
                Mixed::Fail(t) => t.kind(),
                Mixed::Touch(t) => t.kind(),
            }
        }

        fn command(&self) -> CommandLine {
            match self {
                Mixed::Fail(t) => t.command(),
                Mixed::Touch(t) => t.command(),
            }
        }
    }

    let mut workers = vec![Worker::new(&ids, 0, Mixed::Fail(ExitTask { code: 2 }))];
    for marker in &markers {
        workers.push(Worker::new(
            &ids,
            0,
            Mixed::Touch(TouchTask {
                marker: marker.clone(),
                seconds: 0.2,
            }),
        ));
    }

    let err = run_workers(workers, 4).await.unwrap_err();
    match err {
        Error::Execution {
            exit_code,
            stderr_tail,
            ..
        } => {
            assert_eq!(exit_code, 2);
            assert!(stderr_tail.contains("failing"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Drain-then-propagate: every started sibling ran to completion.
    for marker in &markers {
        assert!(marker.exists(), "sibling was abandoned: {marker:?}");
    }
}

struct BadPostProcessTask;

#[async_trait]
impl Task for BadPostProcessTask {
    fn kind(&self) -> &str {
        "bad-post"
    }

    fn command(&self) -> CommandLine {
        CommandLine::new("/bin/true")
    }

    async fn post_process(&mut self) -> Result<()> {
        Err(Error::MalformedTable {
            path: PathBuf::from("/nonexistent"),
            reason: "deliberate".into(),
        })
    }
}

#[tokio::test]
async fn post_processing_failure_is_distinct_from_execution_failure() {
    let ids = WorkerIdGen::new();
    let workers = vec![Worker::new(&ids, 0, BadPostProcessTask)];
    let err = run_workers(workers, 1).await.unwrap_err();
    assert!(matches!(err, Error::PostProcessing { .. }));
}

// ============================================================================
// Observed Statistics
// ============================================================================

const FAKE_OBSERVED: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out=$2; shift 2 ;;
        -c|-s) shift 2 ;;
        *) shift ;;
    esac
done
printf 'PRI.t.1\tpi.1\twattTheta.1\n0.9\t0.05\t0.06\n' > "$out"
"#;

#[tokio::test]
async fn observed_stats_worker_keeps_stat_columns_only() {
    use std::os::unix::fs::PermissionsExt;
    use abcpool_kernel::sim::ObservedStatsTask;

    let fs = temp_fs();
    let exe = fs.base_dir().join("fake-observed.sh");
    std::fs::write(&exe, FAKE_OBSERVED).unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

    let output = fs.base_dir().join("observed-1.txt");
    let ids = WorkerIdGen::new();
    let task = ObservedStatsTask::new(
        &exe,
        "model.cfg",
        Some(7),
        &output,
        RuleSet::simulator_defaults().unwrap(),
        &fs,
    )
    .unwrap();
    let done = run_workers(vec![Worker::new(&ids, 0, task)], 1).await.unwrap();

    assert_eq!(done[0].task.stat_names(), ["pi.1", "wattTheta.1"]);
    let text = tokio::fs::read_to_string(&output).await.unwrap();
    assert_eq!(text, "pi.1\twattTheta.1\n0.05\t0.06\n");
}

#[tokio::test]
async fn rejection_schema_merges_headerless() {
    let fs = temp_fs();
    let exe = install_fake_simulator(&fs);

    let ids = WorkerIdGen::new();
    let mut rng = StdRng::seed_from_u64(77);
    let workers: Vec<Worker<SimulationTask>> = (0..2)
        .map(|_| {
            let spec = JobSpec::new(&exe, "model.cfg", 4).schema(OutputSchema::Rejection);
            let task = SimulationTask::new(
                spec,
                RuleSet::simulator_defaults().unwrap(),
                &fs,
                &mut rng,
            )
            .unwrap();
            Worker::new(&ids, 0, task)
        })
        .collect();

    let done = run_workers(workers, 2).await.unwrap();
    let inputs: Vec<PathBuf> = done
        .iter()
        .map(|w| w.task.output_path().to_path_buf())
        .collect();

    // Projected rejection files carry no header and a trailing delimiter.
    let first = tokio::fs::read_to_string(&inputs[0]).await.unwrap();
    assert!(first.starts_with("0.1\t"));
    assert!(first.lines().next().unwrap().ends_with('\t'));

    let merged = fs.base_dir().join("merged-rejection.txt");
    let rows = merge_projected_files(&inputs, &merged, false, 8)
        .await
        .unwrap();
    assert_eq!(rows, 8);
}
