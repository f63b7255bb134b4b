use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use vexbench_bench::error::AggregateFailure;
use vexbench_bench::executor::{dispatch, RegionExecutor, TaskHandle};
use vexbench_bench::matrix::{self, Region};
use vexbench_bench::tasks::{self, task_label, TaskContext};
use vexbench_core::bench::Mode;
use vexbench_core::config::{self, SIZES};
use vexbench_core::provider::ProviderKind;

#[derive(Parser)]
#[command(name = "vexbench", about = "Multi-backend vector search benchmark harness")]
struct Cli {
    /// Base directory metrics artifacts are written under
    #[arg(long, default_value = "metrics")]
    metrics_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bulk-ingest the dataset into each backend
    Ingest(MatrixArgs),

    /// Query throughput sweep at increasing concurrency
    Qps(QueryArgs),

    /// Filtered-query selectivity sweep
    Filters(QueryArgs),

    /// Read-only baseline followed by a mixed read/write pass
    Rw(QueryArgs),

    /// Enumerate benchmark collections and optionally delete them
    Cleanup {
        /// Restrict to one provider
        #[arg(long)]
        provider: Option<String>,

        /// Actually delete; without this flag nothing is mutated
        #[arg(long, default_value_t = false)]
        wet: bool,
    },
}

#[derive(Args)]
struct MatrixArgs {
    /// Restrict to one dataset size (100k, 1m, 10m)
    #[arg(long)]
    size: Option<String>,

    /// Restrict to one provider
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Args)]
struct QueryArgs {
    #[command(flatten)]
    matrix: MatrixArgs,

    /// Duration of one measured pass in seconds
    #[arg(long, default_value_t = config::DEFAULT_QUERY_TIMEOUT_SECS)]
    timeout: u64,

    /// Pre-fetched JSON-lines query file (query vectors + ground-truth
    /// ids); a deterministic synthetic query set is used when absent
    #[arg(long)]
    queries: Option<PathBuf>,

    /// Skip the unmeasured warmup pass that otherwise runs first
    #[arg(long, default_value_t = false)]
    no_warmup: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(
                    "vexbench_bench=info"
                        .parse()
                        .expect("valid directive literal"),
                )
                .add_directive(
                    "vexbench_core=info"
                        .parse()
                        .expect("valid directive literal"),
                ),
        )
        .init();

    let cli = Cli::parse();
    let benchmark_id = Uuid::new_v4().to_string();

    let result = match cli.command {
        Command::Ingest(args) => {
            let ctx = context(
                &benchmark_id,
                &cli.metrics_dir,
                config::DEFAULT_QUERY_TIMEOUT_SECS,
                false,
                None,
            );
            run_matrix(Mode::Ingest, &args, ctx).await
        }
        Command::Qps(args) => {
            let ctx = query_context(&benchmark_id, &cli.metrics_dir, &args);
            run_matrix(Mode::Qps, &args.matrix, ctx).await
        }
        Command::Filters(args) => {
            let ctx = query_context(&benchmark_id, &cli.metrics_dir, &args);
            run_matrix(Mode::Filter, &args.matrix, ctx).await
        }
        Command::Rw(args) => {
            let ctx = query_context(&benchmark_id, &cli.metrics_dir, &args);
            run_matrix(Mode::Rw, &args.matrix, ctx).await
        }
        Command::Cleanup { provider, wet } => run_cleanup(provider.as_deref(), wet).await,
    };

    if let Err(aggregate) = result {
        eprintln!("Error: {aggregate}");
        std::process::exit(1);
    }
}

fn context(
    benchmark_id: &str,
    metrics_dir: &Path,
    timeout_secs: u64,
    warmup: bool,
    queries_file: Option<PathBuf>,
) -> TaskContext {
    TaskContext {
        benchmark_id: benchmark_id.to_string(),
        metrics_dir: metrics_dir.to_path_buf(),
        query_timeout: Duration::from_secs(timeout_secs),
        warmup,
        queries_file,
    }
}

fn query_context(benchmark_id: &str, metrics_dir: &Path, args: &QueryArgs) -> TaskContext {
    context(
        benchmark_id,
        metrics_dir,
        args.timeout,
        !args.no_warmup,
        args.queries.clone(),
    )
}

fn parse_provider(arg: Option<&str>) -> Option<ProviderKind> {
    arg.map(|name| {
        name.parse::<ProviderKind>().unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(2);
        })
    })
}

fn parse_sizes(arg: Option<&str>) -> Vec<&'static str> {
    let sizes = matrix::sizes(arg);
    if sizes.is_empty() {
        eprintln!(
            "Error: unknown dataset size '{}' (expected one of: {})",
            arg.unwrap_or_default(),
            SIZES.join(", ")
        );
        std::process::exit(2);
    }
    sizes
}

async fn run_matrix(
    mode: Mode,
    args: &MatrixArgs,
    ctx: TaskContext,
) -> Result<(), AggregateFailure> {
    let provider = parse_provider(args.provider.as_deref());
    let sizes = parse_sizes(args.size.as_deref());
    let specs = matrix::provider_specs(provider);

    tracing::info!(
        benchmark_id = %ctx.benchmark_id,
        mode = %mode,
        tasks = sizes.len() * specs.len(),
        "Benchmark starting"
    );

    let mut executors: HashMap<Region, RegionExecutor> = HashMap::new();
    let mut handles: Vec<TaskHandle> = Vec::new();
    for spec in specs {
        let executor = executors
            .entry(spec.region)
            .or_insert_with(|| RegionExecutor::new(spec.region));
        for &size in &sizes {
            let label = task_label(mode, spec.kind, size);
            let ctx = ctx.clone();
            let handle = match mode {
                Mode::Ingest => executor.submit(label, tasks::run_ingest_bench(spec, size, ctx)),
                Mode::Qps => executor.submit(label, tasks::run_qps_bench(spec, size, ctx)),
                Mode::Filter => executor.submit(label, tasks::run_filter_bench(spec, size, ctx)),
                Mode::Rw => executor.submit(label, tasks::run_rw_bench(spec, size, ctx)),
            };
            handles.push(handle);
        }
    }

    dispatch(handles).await
}

async fn run_cleanup(provider: Option<&str>, wet: bool) -> Result<(), AggregateFailure> {
    let provider = parse_provider(provider);

    let mut executors: HashMap<Region, RegionExecutor> = HashMap::new();
    let mut handles: Vec<TaskHandle> = Vec::new();
    for spec in matrix::provider_specs(provider) {
        let executor = executors
            .entry(spec.region)
            .or_insert_with(|| RegionExecutor::new(spec.region));
        let label = format!("cleanup/{}", spec.kind);
        handles.push(executor.submit(label, tasks::run_cleanup(spec.kind, wet)));
    }

    dispatch(handles).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_runs_unless_suppressed() {
        let cli = Cli::parse_from(["vexbench", "qps"]);
        match cli.command {
            Command::Qps(args) => assert!(!args.no_warmup),
            _ => panic!("expected the qps subcommand"),
        }

        let cli = Cli::parse_from(["vexbench", "filters", "--no-warmup"]);
        match cli.command {
            Command::Filters(args) => assert!(args.no_warmup),
            _ => panic!("expected the filters subcommand"),
        }
    }

    #[test]
    fn query_file_is_optional() {
        let cli = Cli::parse_from(["vexbench", "rw", "--queries", "q.jsonl"]);
        match cli.command {
            Command::Rw(args) => assert_eq!(args.queries, Some(PathBuf::from("q.jsonl"))),
            _ => panic!("expected the rw subcommand"),
        }
    }
}
