/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use bundlep::analysis::{AnalysisConfig, Bound, PriorityPolicy, Tester, Verdict};
use bundlep::chunks::split::{SplitError, Splitter};
use bundlep::chunks::{ChunkMode, ChunkOutcome, ChunkSolver};
use bundlep::config;
use bundlep::generator::{self, GeneratorConfig, Growth, SkeletonConfig, SkeletonSize};
use bundlep::task::TaskSet;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Chunk-size analysis for bundled multi-thread tasks.
///
/// Example:
///   bundlep --processors 2 chunks tasksets/two_task.yaml
///   bundlep bundle tasksets/one_split.yaml -o split.yaml
#[derive(Debug, Parser)]
#[command(
    name = "bundlep",
    about = "Chunk-size analysis and splitting for BUNDLEP task sets",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    analysis: AnalysisArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct AnalysisArgs {
    /// Priority assignment: dm (deadline-monotonic) or rm (rate-monotonic).
    #[arg(long, global = true, default_value_t = PriorityPolicy::DeadlineMonotonic)]
    policy: PriorityPolicy,

    /// Number of identical processors.
    #[arg(short = 'm', long, global = true, default_value_t = 1)]
    processors: usize,

    /// Interference bound: conservative or exact.
    #[arg(long, global = true, default_value_t = Bound::Conservative)]
    bound: Bound,
}

impl AnalysisArgs {
    fn tester(&self) -> Result<Tester> {
        Tester::new(AnalysisConfig {
            policy: self.policy,
            processors: self.processors,
            bound: self.bound,
        })
        .context("Invalid analysis configuration")
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assign the largest feasible chunk size to every task.
    Chunks {
        /// Task-set description (YAML).
        taskset: PathBuf,

        /// limited (any chunk up to the WCET) or non-preemptive (whole bundle).
        #[arg(long, default_value_t = ChunkMode::Limited)]
        mode: ChunkMode,

        /// Write the set with its chunk sizes to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the schedulability test on the set as written.
    Check {
        taskset: PathBuf,
    },

    /// Divide bundles until every part runs as one non-preemptive chunk.
    Bundle {
        taskset: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the tasks, total utilization and hyperperiod.
    Print {
        taskset: PathBuf,
    },

    /// Fill pending periods and WCETs with a UUniFast draw.
    Generate {
        /// Drafts (YAML); `period: 0` / `wcet: []` mark pending fields.
        drafts: PathBuf,

        /// Total utilization to distribute.
        #[arg(short = 'u', long)]
        utilization: f64,

        /// Seed for a reproducible draw.
        #[arg(long)]
        seed: Option<u64>,

        /// Threads given to tasks whose WCET is pending.
        #[arg(long, default_value_t = 1)]
        threads: usize,

        /// Extra WCET per added thread, relative to one thread; a range
        /// such as `0.2..0.8` draws one factor per task.
        #[arg(long, default_value_t = Growth::Fixed(0.5))]
        growth: Growth,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a draft set with pending WCETs, ready for `generate`.
    Skeleton {
        /// Number of tasks.
        #[arg(short = 'n', long, conflicts_with = "total_threads")]
        tasks: Option<usize>,

        /// Hand out exactly this many threads over as many tasks as needed.
        #[arg(long, required_unless_present = "tasks")]
        total_threads: Option<usize>,

        #[arg(long, default_value_t = 1, requires = "total_threads")]
        min_threads: usize,

        #[arg(long, requires = "total_threads")]
        max_threads: Option<usize>,

        /// Draw periods from `min-period..=max-period`; pending otherwise.
        #[arg(long, requires = "max_period")]
        min_period: Option<u64>,

        #[arg(long, requires = "min_period")]
        max_period: Option<u64>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reshape every WCET vector with a growth factor, keeping utilization.
    Growth {
        taskset: PathBuf,

        /// Fixed factor (`0.5`) or per-task range (`0.2..0.8`).
        #[arg(long)]
        factor: Growth,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run every task single-threaded at its full bundle WCET.
    Merge {
        taskset: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Divide tasks so that none has more than `--max-threads` threads.
    Divide {
        taskset: PathBuf,

        #[arg(long)]
        max_threads: usize,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns `false` when the analysis answer is negative (exit status 1).
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Chunks {
            taskset,
            mode,
            output,
        } => {
            let mut set = config::load_task_set(&taskset)?;
            let solver = ChunkSolver::new(cli.analysis.tester()?, mode);
            let outcomes = solver.assign_all(&mut set)?;

            println!("{set}");
            let mut ok = true;
            for outcome in &outcomes {
                if let ChunkOutcome::Infeasible(inf) = outcome {
                    println!("{inf}");
                    ok = false;
                }
            }
            emit(&set, output.as_deref())?;
            Ok(ok)
        }

        Command::Check { taskset } => {
            let set = config::load_task_set(&taskset)?;
            let tester = cli.analysis.tester()?;
            match tester.check(&set) {
                Verdict::Schedulable { responses } => {
                    for r in &responses {
                        println!("{}: R = {} (D = {})", r.task, r.response, r.deadline);
                    }
                    println!("schedulable");
                    Ok(true)
                }
                Verdict::Unschedulable { failure } => {
                    println!("not schedulable: {failure}");
                    Ok(false)
                }
            }
        }

        Command::Bundle { taskset, output } => {
            let set = config::load_task_set(&taskset)?;
            let splitter = Splitter::new(cli.analysis.tester()?);
            let report = match splitter.bundle(set) {
                Ok(report) => report,
                Err(SplitError::Infeasible(inf)) => {
                    println!("{inf}");
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };

            for d in &report.divisions {
                println!("{} -> {}", d.parent, d.parts.join(", "));
            }
            println!("{}", report.task_set);
            emit(&report.task_set, output.as_deref())?;
            Ok(true)
        }

        Command::Print { taskset } => {
            let set = config::load_task_set(&taskset)?;
            print_summary(&set);
            Ok(true)
        }

        Command::Generate {
            drafts,
            utilization,
            seed,
            threads,
            growth,
            output,
        } => {
            let draft = config::load_drafts(&drafts)?;
            let mut rng = seeded(seed);
            let gen_config = GeneratorConfig {
                threads,
                thread_growth: growth,
            };
            let set = generator::resolve_drafts(draft, utilization, &mut rng, &gen_config)
                .context("Task-set generation failed")?;

            print_summary(&set);
            emit(&set, output.as_deref())?;
            Ok(true)
        }

        Command::Skeleton {
            tasks,
            total_threads,
            min_threads,
            max_threads,
            min_period,
            max_period,
            seed,
            output,
        } => {
            let size = match (tasks, total_threads) {
                (Some(n), _) => SkeletonSize::Tasks(n),
                (None, Some(total)) => SkeletonSize::Threads {
                    total,
                    per_task: min_threads..=max_threads.unwrap_or(total),
                },
                (None, None) => bail!("Give either --tasks or --total-threads"),
            };
            let periods = min_period.zip(max_period).map(|(lo, hi)| lo..=hi);
            let draft = generator::skeleton(&SkeletonConfig { size, periods }, &mut seeded(seed))
                .context("Skeleton generation failed")?;

            match output {
                Some(path) => config::write_drafts(&draft, &path)?,
                None => print!("{}", config::drafts_to_yaml(&draft)?),
            }
            Ok(true)
        }

        Command::Growth {
            taskset,
            factor,
            seed,
            output,
        } => {
            let mut set = config::load_task_set(&taskset)?;
            generator::apply_growth_factors(&mut set, factor, &mut seeded(seed))
                .context("Cannot apply growth factors")?;
            publish(&set, output.as_deref())?;
            Ok(true)
        }

        Command::Merge { taskset, output } => {
            let mut set = config::load_task_set(&taskset)?;
            set.merge_threads();
            publish(&set, output.as_deref())?;
            Ok(true)
        }

        Command::Divide {
            taskset,
            max_threads,
            output,
        } => {
            let mut set = config::load_task_set(&taskset)?;
            let divisions = set
                .divide_max_threads(max_threads)
                .context("Cannot divide task set")?;
            info!(divisions, max_threads, "Divided task set");
            publish(&set, output.as_deref())?;
            Ok(true)
        }
    }
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn print_summary(set: &TaskSet) {
    println!("{set}");
    println!("U = {:.3}", set.utilization());
    match set.hyperperiod() {
        Ok(info) => println!("H = {}", info.hyperperiod),
        Err(e) => warn!("No hyperperiod: {e}"),
    }
}

/// Write `set` to `output` when given.
fn emit(set: &TaskSet, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        config::write_task_set(set, path)?;
    }
    Ok(())
}

/// Write `set` to `output`, or as YAML to stdout.
fn publish(set: &TaskSet, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => config::write_task_set(set, path),
        None => {
            print!("{}", config::to_yaml(set)?);
            Ok(())
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    // Logs go to stderr so results on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(
        policy = %cli.analysis.policy,
        processors = cli.analysis.processors,
        bound = %cli.analysis.bound,
        "Configuration"
    );

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            process::exit(2);
        }
    }
}
