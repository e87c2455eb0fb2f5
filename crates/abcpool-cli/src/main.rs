//! abcpool CLI entry point.
//!
//! Usage:
//!   abcpool --exe <simulator> --config <path> --reps <n> [options]
//!
//! Drives parallel simulator invocations, reduces their raw tables to the
//! requested schema, merges per-config results with replicate-count
//! validation, and writes per-column summary statistics. With `--reps 0`
//! it instead runs the observed-statistics program over each config.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use abcpool_kernel::patterns::{RuleSet, rules_from_prefixes};
use abcpool_kernel::pool::{group_by_tag, run_workers};
use abcpool_kernel::sim::{ObservedStatsTask, SimulationTask};
use abcpool_kernel::stats::{summarize_columns, write_summary};
use abcpool_kernel::tempfs::TempFileSystem;
use abcpool_kernel::worker::{Worker, WorkerIdGen};
use abcpool_kernel::{JobSpec, OutputSchema, merge_projected_files};

fn main() -> ExitCode {
    // Respects RUST_LOG; the single subscriber is the one serialized sink
    // every worker logs through.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug)]
struct Options {
    exe_path: PathBuf,
    observed_exe_path: Option<PathBuf>,
    config_paths: Vec<PathBuf>,
    reps: u64,
    max_parallel: usize,
    seed: Option<u64>,
    schema: OutputSchema,
    sort_index: Option<u32>,
    stat_prefixes: Vec<String>,
    output_dir: PathBuf,
    temp_dir: Option<PathBuf>,
    keep_temps: bool,
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("abcpool {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let opts = parse_args(&args)?;
    let runtime = tokio::runtime::Runtime::new()?;
    // The whole run is synchronous from here: this call returns only when
    // every worker has completed or raised and all artifacts are written.
    runtime.block_on(run_pipeline(opts))
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut exe_path = None;
    let mut observed_exe_path = None;
    let mut config_paths = Vec::new();
    let mut reps: u64 = 0;
    let mut max_parallel = std::thread::available_parallelism().map_or(1, |n| n.get());
    let mut seed = None;
    let mut schema = OutputSchema::Regression;
    let mut sort_index = None;
    let mut stat_prefixes = Vec::new();
    let mut output_dir = PathBuf::from(".");
    let mut temp_dir = None;
    let mut keep_temps = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "--exe" => exe_path = Some(PathBuf::from(value("--exe")?)),
            "--observed-exe" => observed_exe_path = Some(PathBuf::from(value("--observed-exe")?)),
            "--config" | "-c" => config_paths.push(PathBuf::from(value("--config")?)),
            "--reps" | "-r" => reps = value("--reps")?.parse().context("--reps must be an integer")?,
            "--parallel" | "-P" => {
                max_parallel = value("--parallel")?
                    .parse()
                    .context("--parallel must be an integer")?;
            }
            "--seed" => seed = Some(value("--seed")?.parse().context("--seed must be an integer")?),
            "--schema" => schema = OutputSchema::from_str(&value("--schema")?)?,
            "--sort-index" => {
                sort_index = Some(
                    value("--sort-index")?
                        .parse()
                        .context("--sort-index must be an integer")?,
                );
            }
            "--stat-prefix" => stat_prefixes.push(value("--stat-prefix")?),
            "--output-dir" | "-o" => output_dir = PathBuf::from(value("--output-dir")?),
            "--temp-dir" => temp_dir = Some(PathBuf::from(value("--temp-dir")?)),
            "--keep-temps" => keep_temps = true,
            other => bail!("unrecognized argument: {other}"),
        }
    }

    let Some(exe_path) = exe_path else {
        bail!("--exe is required (see --help)");
    };
    if config_paths.is_empty() {
        bail!("at least one --config is required (see --help)");
    }
    Ok(Options {
        exe_path,
        observed_exe_path,
        config_paths,
        reps,
        max_parallel,
        seed,
        schema,
        sort_index,
        stat_prefixes,
        output_dir,
        temp_dir,
        keep_temps,
    })
}

async fn run_pipeline(opts: Options) -> Result<()> {
    let seed = opts.seed.unwrap_or_else(|| {
        rand::thread_rng().gen_range(1..=999_999_999)
    });
    tracing::info!(seed, "run seed");
    let mut rng = StdRng::seed_from_u64(seed);

    let temp_parent = opts.temp_dir.clone().unwrap_or_else(|| opts.output_dir.clone());
    let mut temp_fs = TempFileSystem::new(&temp_parent, "abcpool-run-", opts.keep_temps)?;

    let rules = if opts.stat_prefixes.is_empty() {
        RuleSet::simulator_defaults()?
    } else {
        RuleSet::with_stat_rules(rules_from_prefixes(&opts.stat_prefixes, true)?)?
    };

    let result = if opts.reps == 0 {
        run_observed(&opts, &rules, &temp_fs).await
    } else {
        run_simulations(&opts, &rules, &temp_fs, &mut rng, seed).await
    };

    // Purge even on failure, but let the pipeline error win.
    let purged = temp_fs.purge();
    result?;
    purged?;
    Ok(())
}

/// Simulate `reps` replicates per config, merge per-config outputs, and
/// summarize.
async fn run_simulations(
    opts: &Options,
    rules: &RuleSet,
    temp_fs: &TempFileSystem,
    rng: &mut StdRng,
    seed: u64,
) -> Result<()> {
    let ids = WorkerIdGen::new();
    let multiple_models = opts.config_paths.len() > 1;
    let batches = batch_sizes(opts.reps, opts.max_parallel);

    let mut workers = Vec::new();
    for (tag, config) in opts.config_paths.iter().enumerate() {
        for &batch in &batches {
            let mut spec = JobSpec::new(&opts.exe_path, config, batch)
                .schema(opts.schema)
                .tag(tag);
            if let Some(sort_index) = opts.sort_index {
                spec = spec.sort_index(sort_index);
            }
            if multiple_models {
                spec = spec.model_index(tag as u32 + 1);
            }
            let task = SimulationTask::new(spec, rules.clone(), temp_fs, rng)?;
            workers.push(Worker::new(&ids, tag, task));
        }
    }

    let done = run_workers(workers, opts.max_parallel).await?;

    let mut outputs = Vec::new();
    for (tag, group) in group_by_tag(done) {
        let inputs: Vec<PathBuf> = group
            .iter()
            .map(|w| w.task.output_path().to_path_buf())
            .collect();
        let merged = opts.output_dir.join(format!("samples-{}.txt", tag + 1));
        merge_projected_files(&inputs, &merged, opts.schema.include_header(), opts.reps).await?;
        tracing::info!(config = tag + 1, path = %merged.display(), "merged sample file");

        if opts.schema.include_header() {
            let summaries = summarize_columns(&merged, '\t').await?;
            let summary_path = opts
                .output_dir
                .join(format!("means-and-std-devs-{}.txt", tag + 1));
            write_summary(&summaries, &summary_path, '\t').await?;
            outputs.push(serde_json::json!({
                "config": opts.config_paths[tag].display().to_string(),
                "samples": merged.display().to_string(),
                "summary": summary_path.display().to_string(),
            }));
        } else {
            outputs.push(serde_json::json!({
                "config": opts.config_paths[tag].display().to_string(),
                "samples": merged.display().to_string(),
            }));
        }
    }

    write_run_info(opts, seed, &outputs).await
}

/// Run the observed-statistics program once per config; outputs land
/// directly in the output directory.
async fn run_observed(opts: &Options, rules: &RuleSet, temp_fs: &TempFileSystem) -> Result<()> {
    let Some(observed_exe) = &opts.observed_exe_path else {
        bail!("--observed-exe is required when --reps is 0");
    };
    let ids = WorkerIdGen::new();
    let mut workers = Vec::new();
    for (tag, config) in opts.config_paths.iter().enumerate() {
        let output = opts.output_dir.join(format!("observed-{}.txt", tag + 1));
        let task = ObservedStatsTask::new(
            observed_exe,
            config,
            opts.sort_index,
            output,
            rules.clone(),
            temp_fs,
        )?;
        workers.push(Worker::new(&ids, tag, task));
    }

    let done = run_workers(workers, opts.max_parallel).await?;
    for worker in &done {
        tracing::info!(
            path = %worker.task.output_path().display(),
            stats = worker.task.stat_names().len(),
            "observed statistics written"
        );
    }
    Ok(())
}

/// Split `reps` replicates across workers: one replicate each when the
/// pool is wide enough, otherwise `max_parallel` equal batches plus a
/// remainder batch.
fn batch_sizes(reps: u64, max_parallel: usize) -> Vec<u64> {
    let np = max_parallel.max(1) as u64;
    if reps <= np {
        return vec![1; reps as usize];
    }
    let (quotient, remainder) = (reps / np, reps % np);
    let mut batches = vec![quotient; np as usize];
    if remainder > 0 {
        batches.push(remainder);
    }
    batches
}

async fn write_run_info(opts: &Options, seed: u64, outputs: &[serde_json::Value]) -> Result<()> {
    let info = serde_json::json!({
        "seed": seed,
        "replicates": opts.reps,
        "max_parallel": opts.max_parallel,
        "schema": opts.schema.as_str(),
        "sort_index": opts.sort_index,
        "configs": opts
            .config_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>(),
        "outputs": outputs,
    });
    let path = opts.output_dir.join("run-info.json");
    tokio::fs::write(&path, serde_json::to_string_pretty(&info)?).await?;
    tracing::info!(path = %path.display(), "wrote run info");
    Ok(())
}

fn print_help() {
    println!(
        "abcpool — parallel simulation runner

USAGE:
    abcpool --exe <simulator> --config <path> --reps <n> [options]

OPTIONS:
    --exe <path>            Simulator executable
    --observed-exe <path>   Observed-statistics executable (used with --reps 0)
    -c, --config <path>     Model config; repeat for several models
    -r, --reps <n>          Replicates per config (0 = observed mode)
    -P, --parallel <n>      Max simultaneous processes (default: CPU count)
    --seed <n>              Run seed (default: random)
    --schema <name>         Output schema: rejection | regression (default)
    --sort-index <n>        Sub-unit sort index forwarded to the simulator
    --stat-prefix <p>       Statistic prefix to keep; repeat as needed
    -o, --output-dir <dir>  Where merged outputs land (default: .)
    --temp-dir <dir>        Staging directory (default: output dir)
    --keep-temps            Keep temporary files for debugging
    -h, --help              Show this help
    -V, --version           Show version"
    );
}
