//! Bounded-concurrency scheduling of workers.
//!
//! A semaphore caps the number of simultaneously live external processes;
//! the instant any worker finishes, its permit admits the next queued one,
//! so one slow worker never stalls a whole batch. `run_workers` returns
//! only once every submitted worker has completed or raised.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use abcpool_types::{Error, Result};
use tokio::sync::Semaphore;

use crate::worker::{Task, Worker};

/// Outcome of an instrumented pool run.
pub struct PoolRun<T: Task> {
    /// Every worker that completed, in submission order.
    pub workers: Vec<Worker<T>>,
    /// Highest number of simultaneously active workers observed.
    pub peak_active: usize,
}

/// Run `workers` with at most `max_parallel` external processes active at
/// once. A `max_parallel` of zero is treated as one.
///
/// Failure policy: every already-started worker is drained before any
/// error propagates, so the pool never orphans an OS process; the error
/// returned is from the earliest-submitted worker that failed. Completion
/// order across jobs is unspecified; regroup with [`group_by_tag`].
pub async fn run_workers<T>(workers: Vec<Worker<T>>, max_parallel: usize) -> Result<Vec<Worker<T>>>
where
    T: Task + 'static,
{
    run_workers_instrumented(workers, max_parallel)
        .await
        .map(|run| run.workers)
}

/// [`run_workers`], also reporting the observed concurrency peak.
pub async fn run_workers_instrumented<T>(
    workers: Vec<Worker<T>>,
    max_parallel: usize,
) -> Result<PoolRun<T>>
where
    T: Task + 'static,
{
    let max_parallel = max_parallel.max(1);
    let total = workers.len();
    tracing::info!(total, max_parallel, "dispatching workers");

    let semaphore = Arc::new(Semaphore::new(max_parallel));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(total);
    for mut worker in workers {
        let permit = semaphore.clone().acquire_owned().await;
        let active = active.clone();
        let peak = peak.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit; // hold the slot until this worker is done
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            let started = worker.start().await;
            active.fetch_sub(1, Ordering::SeqCst);
            match started {
                Ok(()) => worker.finish().await.map(|()| worker),
                Err(e) => Err(e),
            }
        });
        handles.push(handle);
    }

    let mut completed = Vec::with_capacity(total);
    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(worker)) => completed.push(worker),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "worker failed");
                first_error.get_or_insert(e);
            }
            Err(join_error) => {
                first_error.get_or_insert(Error::Panicked(join_error.to_string()));
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    tracing::info!(completed = completed.len(), "all workers drained");
    Ok(PoolRun {
        workers: completed,
        peak_active: peak.load(Ordering::SeqCst),
    })
}

/// Regroup drained workers by their caller-supplied group key, the only
/// authoritative way to reconstruct logical batches after parallel
/// dispatch.
pub fn group_by_tag<T: Task>(workers: Vec<Worker<T>>) -> BTreeMap<usize, Vec<Worker<T>>> {
    let mut groups: BTreeMap<usize, Vec<Worker<T>>> = BTreeMap::new();
    for worker in workers {
        groups.entry(worker.tag()).or_default().push(worker);
    }
    groups
}
