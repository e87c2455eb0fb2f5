//! Task implementations: the simulator run and the observed-statistics
//! run.
//!
//! Both plug into [`Worker`](crate::worker::Worker) through the
//! [`Task`](crate::worker::Task) capability trait; the worker owns the
//! process, the task owns the command line and the artifact handling.

use std::path::{Path, PathBuf};

use abcpool_types::{JobSpec, OutputSchema, Result};
use async_trait::async_trait;
use rand::Rng;
use rand::rngs::StdRng;

use crate::header::indices_of_rules;
use crate::patterns::{RuleSet, all_stat_rules, parameter_rules};
use crate::project::{project_for_rejection, project_for_regression, project_observed_stats};
use crate::tempfs::TempFileSystem;
use crate::worker::{CommandLine, Task};

/// Inclusive range simulator seeds are drawn from when a job does not pin
/// one.
const SEED_RANGE: std::ops::RangeInclusive<u64> = 1..=999_999_999;

/// One simulator invocation: builds the command line, then reduces the raw
/// table to the projected sample plus a companion header artifact.
pub struct SimulationTask {
    spec: JobSpec,
    rules: RuleSet,
    seed: u64,
    work_dir: PathBuf,
    output_path: PathBuf,
    header_path: PathBuf,
    stderr_path: PathBuf,
    header: Vec<String>,
    parameter_indices: Vec<usize>,
    stat_indices: Vec<usize>,
}

impl SimulationTask {
    /// Build a task from an immutable job spec.
    ///
    /// The seed comes from the spec when pinned, otherwise it is drawn
    /// once from the injected RNG handle, so a caller holding a seeded
    /// `StdRng` gets a reproducible run. The task claims an exclusive
    /// subdirectory of `temp_fs` for everything it writes.
    pub fn new(
        spec: JobSpec,
        rules: RuleSet,
        temp_fs: &TempFileSystem,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let seed = spec.seed.unwrap_or_else(|| rng.gen_range(SEED_RANGE));
        let work_dir =
            temp_fs.create_subdir(&format!("sim-{}-{}", spec.replicates, seed))?;
        let stem = format!("sample-{}-{}", spec.replicates, seed);
        let output_path = work_dir.join(format!("{stem}.txt"));
        let header_path = work_dir.join(format!("{stem}-header.txt"));
        let stderr_path = work_dir.join("stderr.log");
        Ok(Self {
            spec,
            rules,
            seed,
            work_dir,
            output_path,
            header_path,
            stderr_path,
            header: Vec::new(),
            parameter_indices: Vec::new(),
            stat_indices: Vec::new(),
        })
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The projected sample table.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// The companion header artifact: one tab-delimited line naming the
    /// projected columns in ascending original order.
    pub fn header_path(&self) -> &Path {
        &self.header_path
    }

    /// Projected column names, populated by `finalize`.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Parameter-column positions within the projected header, populated
    /// by `finalize`.
    pub fn parameter_indices(&self) -> &[usize] {
        &self.parameter_indices
    }

    /// Stat-column positions within the projected header, populated by
    /// `finalize`.
    pub fn stat_indices(&self) -> &[usize] {
        &self.stat_indices
    }
}

#[async_trait]
impl Task for SimulationTask {
    fn kind(&self) -> &str {
        "sim"
    }

    fn command(&self) -> CommandLine {
        let mut cmd = CommandLine::new(&self.spec.exe_path)
            .arg("-r")
            .arg(self.spec.replicates.to_string())
            .arg("-c")
            .arg(self.spec.config_path.display().to_string())
            .arg("-o")
            .arg(self.output_path.display().to_string())
            .arg("-S")
            .arg(self.seed.to_string());
        if let Some(sort_index) = self.spec.sort_index {
            cmd = cmd.arg("-s").arg(sort_index.to_string());
        }
        if let Some(model_index) = self.spec.model_index {
            cmd = cmd.arg("-m").arg(model_index.to_string());
        }
        if self.spec.report_parameters {
            cmd = cmd.arg("-p");
        }
        cmd
    }

    fn stderr_path(&self) -> Option<PathBuf> {
        Some(self.stderr_path.clone())
    }

    /// Move the raw table aside, classify its header, stream-project it
    /// back to the declared output path, and record the companion header
    /// artifact. Only the header line is ever parsed; the body streams.
    async fn post_process(&mut self) -> Result<()> {
        let raw = raw_path(&self.output_path);
        tokio::fs::rename(&self.output_path, &raw).await?;
        let names = match self.spec.schema {
            OutputSchema::Rejection => {
                project_for_rejection(&raw, &self.output_path, &self.rules).await?
            }
            OutputSchema::Regression => {
                project_for_regression(&raw, &self.output_path, &self.rules).await?
            }
        };
        tokio::fs::write(&self.header_path, format!("{}\n", names.join("\t"))).await?;
        tokio::fs::remove_file(&raw).await?;
        Ok(())
    }

    /// Parse the companion artifact into a typed header plus parameter and
    /// stat index sets. The stat set uses the all-stats fallback, so every
    /// projected non-parameter column counts.
    async fn finalize(&mut self) -> Result<()> {
        let text = tokio::fs::read_to_string(&self.header_path).await?;
        self.header = text.trim().split('\t').map(str::to_string).collect();
        self.parameter_indices = indices_of_rules(&self.header, &parameter_rules()?);
        self.stat_indices = indices_of_rules(&self.header, &all_stat_rules()?);
        Ok(())
    }
}

/// The raw-output rename target: `<output>.raw` alongside the final path.
fn raw_path(output: &Path) -> PathBuf {
    let mut os = output.as_os_str().to_os_string();
    os.push(".raw");
    PathBuf::from(os)
}

/// One observed-statistics invocation: runs the summary-statistics
/// program over real data and keeps only the stat columns, header
/// included.
pub struct ObservedStatsTask {
    exe_path: PathBuf,
    config_path: PathBuf,
    sort_index: Option<u32>,
    raw_path: PathBuf,
    output_path: PathBuf,
    rules: RuleSet,
    stat_names: Vec<String>,
}

impl ObservedStatsTask {
    pub fn new(
        exe_path: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        sort_index: Option<u32>,
        output_path: impl Into<PathBuf>,
        rules: RuleSet,
        temp_fs: &TempFileSystem,
    ) -> Result<Self> {
        let work_dir = temp_fs.create_subdir("obs")?;
        Ok(Self {
            exe_path: exe_path.into(),
            config_path: config_path.into(),
            sort_index,
            raw_path: work_dir.join("observed-raw.txt"),
            output_path: output_path.into(),
            rules,
            stat_names: Vec::new(),
        })
    }

    /// The projected observed-statistics table.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Stat column names kept by the projection, populated by
    /// `post_process`.
    pub fn stat_names(&self) -> &[String] {
        &self.stat_names
    }
}

#[async_trait]
impl Task for ObservedStatsTask {
    fn kind(&self) -> &str {
        "obs"
    }

    fn command(&self) -> CommandLine {
        let mut cmd = CommandLine::new(&self.exe_path)
            .arg("-c")
            .arg(self.config_path.display().to_string());
        if let Some(sort_index) = self.sort_index {
            cmd = cmd.arg("-s").arg(sort_index.to_string());
        }
        cmd.arg("-o").arg(self.raw_path.display().to_string())
    }

    async fn post_process(&mut self) -> Result<()> {
        self.stat_names =
            project_observed_stats(&self.raw_path, &self.output_path, &self.rules).await?;
        Ok(())
    }
}
