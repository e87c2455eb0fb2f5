//! abcpool-kernel: the concurrency and data-transformation engine.
//!
//! This crate provides:
//!
//! - **tempfs**: run-scoped temp storage with exclusive per-worker subdirs
//! - **patterns**: ordered regex rule sets for column names
//! - **header**: header parsing and first-match-wins classification
//! - **project**: streaming column projection over delimited tables
//! - **stats**: constant-memory running statistics
//! - **worker**: the process lifecycle and the `Task` capability trait
//! - **sim**: simulation and observed-statistics tasks
//! - **pool**: bounded-concurrency scheduling of workers
//! - **merge**: header-once concatenation with replicate-count validation

pub mod header;
pub mod merge;
pub mod patterns;
pub mod pool;
pub mod project;
pub mod sim;
pub mod stats;
pub mod tempfs;
pub mod worker;

pub use abcpool_types::{Error, ExecReport, JobSpec, OutputSchema, Result};
pub use header::{ColumnCategory, HeaderSchema, indices_of_rules, parse_header};
pub use merge::{line_count, merge_projected_files};
pub use patterns::{Rule, RuleSet, rules_from_prefixes};
pub use pool::{PoolRun, group_by_tag, run_workers, run_workers_instrumented};
pub use project::{ColumnProjection, reduce_columns};
pub use sim::{ObservedStatsTask, SimulationTask};
pub use stats::{SampleSummarizer, summarize_columns, write_summary};
pub use tempfs::TempFileSystem;
pub use worker::{CommandLine, Task, Worker, WorkerIdGen, WorkerStatus};
