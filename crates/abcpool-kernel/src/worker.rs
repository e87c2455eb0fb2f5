//! Worker lifecycle — one external process plus its post-processing.
//!
//! A worker drives exactly one task through
//! `Created → Started → Running → {PostProcessing → Finished} | Failed`.
//! Acceptance is two-phase: the subprocess exiting zero is necessary but
//! not sufficient, because the task's `post_process` hook may still reject
//! the run. Exactly one [`ExecReport`] travels over the worker's oneshot
//! channel and is consumed by `finish()`.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use abcpool_types::{Error, ExecReport, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::oneshot;

/// How many trailing lines of a failed process's error stream travel in
/// the execution error.
const STDERR_TAIL_LINES: usize = 20;

/// Command line for one external invocation.
#[derive(Debug, Clone)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Shell-ish rendering for log messages.
    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Capability interface implemented per job kind.
///
/// The worker owns the process lifecycle; a task contributes the command
/// to run, where its streams go, and the two acceptance hooks. Both hooks
/// default to no-ops.
#[async_trait]
pub trait Task: Send {
    /// Short kind label, combined with the worker id into the worker name.
    fn kind(&self) -> &str;

    /// The command to execute.
    fn command(&self) -> CommandLine;

    /// File the process's stdout streams to. Large simulator output must
    /// always be file-redirected; pipes are acceptable only for small
    /// diagnostic streams, since pipe buffering risks deadlock with
    /// multi-gigabyte tables.
    fn stdout_path(&self) -> Option<PathBuf> {
        None
    }

    /// File the process's stderr streams to; captured via pipe when
    /// absent.
    fn stderr_path(&self) -> Option<PathBuf> {
        None
    }

    /// Runs after the process exits zero, while the worker is still owned
    /// by the pool. Failure is fatal and distinct from process failure.
    async fn post_process(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs when the result is drained; parses derived artifacts into
    /// typed in-memory form.
    async fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Generates unique worker ids. Owned by whoever builds the workers and
/// injected at construction; there is no global counter.
#[derive(Debug, Default)]
pub struct WorkerIdGen {
    next: AtomicU64,
}

impl WorkerIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Created,
    Started,
    Running,
    PostProcessing,
    Finished,
    Failed,
}

/// The execution unit driving one task's OS process plus its
/// post-processing. Owned exclusively by the pool from dispatch until its
/// result is drained.
pub struct Worker<T: Task> {
    pub task: T,
    id: u64,
    tag: usize,
    status: WorkerStatus,
    exit_code: Option<i32>,
    pid: Option<u32>,
    report_tx: Option<oneshot::Sender<ExecReport>>,
    report_rx: Option<oneshot::Receiver<ExecReport>>,
}

impl<T: Task> fmt::Debug for Worker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("kind", &self.task.kind())
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("status", &self.status)
            .field("exit_code", &self.exit_code)
            .field("pid", &self.pid)
            .finish()
    }
}

impl<T: Task> Worker<T> {
    pub fn new(ids: &WorkerIdGen, tag: usize, task: T) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            task,
            id: ids.next_id(),
            tag,
            status: WorkerStatus::Created,
            exit_code: None,
            pid: None,
            report_tx: Some(tx),
            report_rx: Some(rx),
        }
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.task.kind(), self.id)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The caller-supplied group key.
    pub fn tag(&self) -> usize {
        self.tag
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn finished(&self) -> bool {
        self.status == WorkerStatus::Finished
    }

    /// Spawn the task's command, wait for it to exit, and run the task's
    /// post-processing. Blocks (asynchronously) until both are done.
    ///
    /// A non-zero exit becomes a fatal [`Error::Execution`] carrying the
    /// tail of the error stream; a post-processing failure becomes a
    /// fatal [`Error::PostProcessing`]. Neither is retried here.
    pub async fn start(&mut self) -> Result<()> {
        let name = self.name();
        let command = self.task.command();
        tracing::info!(worker = %name, command = %command.display(), "starting process");
        self.status = WorkerStatus::Started;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        cmd.stdin(Stdio::null());

        let stdout_path = self.task.stdout_path();
        let stderr_path = self.task.stderr_path();
        match &stdout_path {
            Some(path) => {
                cmd.stdout(std::fs::File::create(path)?);
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }
        match &stderr_path {
            Some(path) => {
                cmd.stderr(std::fs::File::create(path)?);
            }
            None => {
                cmd.stderr(Stdio::piped());
            }
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.status = WorkerStatus::Failed;
                return Err(Error::Io(e));
            }
        };
        self.pid = child.id();
        self.status = WorkerStatus::Running;

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => {
                self.status = WorkerStatus::Failed;
                return Err(Error::Io(e));
            }
        };
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code != 0 {
            let stderr = match &stderr_path {
                Some(path) => tokio::fs::read_to_string(path).await.unwrap_or_default(),
                None => String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            self.status = WorkerStatus::Failed;
            tracing::error!(worker = %name, exit_code, "execution failed");
            return Err(Error::Execution {
                name,
                pid: self.pid,
                exit_code,
                stderr_tail: tail_lines(&stderr, STDERR_TAIL_LINES),
            });
        }

        // The report goes out before post-processing, matching the
        // two-phase acceptance: the process result is a fact even when
        // post-processing later rejects the run.
        if let Some(tx) = self.report_tx.take() {
            let _ = tx.send(ExecReport::new(exit_code));
        }

        self.status = WorkerStatus::PostProcessing;
        if let Err(e) = self.task.post_process().await {
            self.status = WorkerStatus::Failed;
            tracing::error!(worker = %name, error = %e, "post-processing failed");
            return Err(Error::post_processing(name, e));
        }
        tracing::debug!(worker = %name, "post-processing complete");
        Ok(())
    }

    /// Retrieve the single exec report and run the task's finalize hook.
    ///
    /// Each worker's report channel is consumed exactly once; a second
    /// call is a caller bug and fails with a configuration error.
    pub async fn finish(&mut self) -> Result<()> {
        let rx = self.report_rx.take().ok_or_else(|| {
            Error::Configuration(format!("{}: exec report already consumed", self.name()))
        })?;
        let report = rx.await.map_err(|_| Error::Execution {
            name: self.name(),
            pid: self.pid,
            exit_code: -1,
            stderr_tail: "worker exited without reporting".into(),
        })?;
        self.exit_code = Some(report.exit_code);
        self.status = WorkerStatus::Finished;
        self.task
            .finalize()
            .await
            .map_err(|e| Error::post_processing(self.name(), e))?;
        Ok(())
    }
}

/// Last `n` lines of `text`, for error diagnostics.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
