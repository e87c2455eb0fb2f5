//! Job descriptions — immutable blueprints for one simulator invocation.

use std::path::PathBuf;

use crate::schema::OutputSchema;

/// Everything needed to invoke the external simulator once.
///
/// A spec is immutable once built; workers derive their command line and
/// artifact paths from it and never write back.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JobSpec {
    /// Path to the simulator executable.
    pub exe_path: PathBuf,
    /// Model-configuration file handed to the simulator.
    pub config_path: PathBuf,
    /// Number of replicates this invocation simulates.
    pub replicates: u64,
    /// Seed for the simulator's RNG. `None` means the worker draws one from
    /// the injected RNG handle at construction.
    pub seed: Option<u64>,
    /// Model index forwarded to the simulator, when running one of several
    /// candidate models.
    pub model_index: Option<u32>,
    /// Canonical ordering of repeated sub-units within one simulated row.
    pub sort_index: Option<u32>,
    /// Ask the simulator to report the drawn parameter values alongside the
    /// summary statistics.
    pub report_parameters: bool,
    /// Layout of the projected output table.
    pub schema: OutputSchema,
    /// Caller-supplied group key, the only authoritative way to reassemble
    /// logical batches after parallel dispatch.
    pub tag: usize,
}

impl JobSpec {
    pub fn new(
        exe_path: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        replicates: u64,
    ) -> Self {
        Self {
            exe_path: exe_path.into(),
            config_path: config_path.into(),
            replicates,
            seed: None,
            model_index: None,
            sort_index: None,
            report_parameters: true,
            schema: OutputSchema::Regression,
            tag: 0,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn model_index(mut self, index: u32) -> Self {
        self.model_index = Some(index);
        self
    }

    pub fn sort_index(mut self, index: u32) -> Self {
        self.sort_index = Some(index);
        self
    }

    pub fn report_parameters(mut self, yes: bool) -> Self {
        self.report_parameters = yes;
        self
    }

    pub fn schema(mut self, schema: OutputSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn tag(mut self, tag: usize) -> Self {
        self.tag = tag;
        self
    }
}
