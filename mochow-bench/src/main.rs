//! Mochow vector database benchmark.
//!
//! Usage:
//!   mochow-bench --host http://127.0.0.1:8511 --api-key KEY      # Cohere 1M, all phases
//!   mochow-bench --dataset-size 100000 --skip-parallel --export  # small case, write results
//!   mochow-bench --synthetic 20000 --synthetic-dim 128           # generated data, exact ground truth
//!   mochow-bench --skip-load --db-name benchmark_db_Zwvmk --table-name benchmark_table_oMvpi

use clap::Parser;
use colored::Colorize;
use mochow_bench::case::{CasePlan, CaseRunner};
use mochow_bench::config::{BenchConfig, CaseTimeouts};
use mochow_bench::dataset::{synthetic, Dataset, DatasetSource};
use mochow_bench::db::{must_normalize, DbBackend, MetricType};
use mochow_bench::metric::numerize;
use mochow_bench::{report, BenchError, BenchResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SYNTHETIC_QUERIES: usize = 1000;
const SYNTHETIC_SEED: u64 = 42;

#[derive(Parser, Debug)]
#[command(name = "mochow-bench", about = "Mochow vector database benchmark", version)]
struct Cli {
    /// TOML config file; `.env` and environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mochow endpoint, e.g. http://127.0.0.1:8511.
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    account: Option<String>,

    #[arg(long)]
    api_key: Option<String>,

    /// Database backend.
    #[arg(long, default_value = "mochow")]
    db: String,

    /// Cohere dataset size: 100000, 1000000 or 10000000.
    #[arg(long, default_value = "1000000")]
    dataset_size: usize,

    /// Use a generated dataset of this many vectors instead of Cohere files.
    #[arg(long)]
    synthetic: Option<usize>,

    /// Dimension of the generated dataset.
    #[arg(long, default_value = "128")]
    synthetic_dim: usize,

    /// Top-k for search and recall.
    #[arg(long, default_value = "10")]
    k: usize,

    /// Parallel search workers (default: number of CPUs).
    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    skip_load: bool,

    #[arg(long)]
    skip_serial: bool,

    #[arg(long)]
    skip_parallel: bool,

    /// Load deadline in seconds (default: per-case table).
    #[arg(long)]
    load_timeout_secs: Option<u64>,

    /// Deadline for each search phase in seconds (default: none).
    #[arg(long)]
    search_timeout_secs: Option<u64>,

    /// Database name (default: benchmark_db_ plus a random suffix).
    #[arg(long)]
    db_name: Option<String>,

    /// Table name (default: benchmark_table_ plus a random suffix).
    #[arg(long)]
    table_name: Option<String>,

    /// Insert vectors as-is instead of L2-normalizing them.
    #[arg(long)]
    no_normalize: bool,

    /// Write results.json and results.csv to the results directory.
    #[arg(long)]
    export: bool,

    /// Results directory (overrides RESULTS_LOCAL_DIR).
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(long)]
    debug: bool,

    /// Also write logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(cli: &Cli) -> BenchResult<()> {
    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn main() -> BenchResult<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let mut config = BenchConfig::load(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config.mochow.host = host.clone();
    }
    if let Some(account) = &cli.account {
        config.mochow.account = account.clone();
    }
    if let Some(api_key) = &cli.api_key {
        config.mochow.api_key = api_key.clone();
    }
    if let Some(dir) = &cli.results_dir {
        config.results_local_dir = dir.clone();
    }
    if cli.k == 0 {
        return Err(BenchError::Config("--k must be positive".into()));
    }

    println!(
        "\n{}",
        "╔══════════════════════════════════════════════════════╗"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "║          Mochow Vector Database Benchmark            ║"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════╝"
            .bold()
            .blue()
    );

    // ── dataset ──
    let (source, queries, dataset_name, size, metric) =
        match cli.synthetic {
            Some(n) => {
                let (source, queries) = synthetic::synthetic(
                    n,
                    cli.synthetic_dim,
                    SYNTHETIC_QUERIES,
                    cli.k,
                    SYNTHETIC_SEED,
                );
                let name = format!("synthetic_{}", numerize(n as u64).to_lowercase());
                (
                    Box::new(source) as Box<dyn DatasetSource>,
                    queries,
                    name,
                    n,
                    MetricType::L2,
                )
            }
            None => {
                let manager = Dataset::Cohere.manager(cli.dataset_size, &config)?;
                manager.prepare()?;
                let queries = manager.query_set();
                let name = manager.dir_name();
                (
                    Box::new(manager) as Box<dyn DatasetSource>,
                    queries,
                    name,
                    cli.dataset_size,
                    Dataset::Cohere.metric_type(),
                )
            }
        };
    let dim = source.dim();
    config.hnsw.metric_type = metric;
    report::print_config(&config);
    println!(
        "  Dataset: {}  Dim: {}  Metric: {}  Queries: {}  TopK: {}",
        dataset_name,
        dim,
        metric,
        queries.len(),
        cli.k
    );

    // ── database ──
    let db_name = cli
        .db_name
        .clone()
        .unwrap_or_else(|| format!("benchmark_db_{}", random_suffix(5)));
    let table_name = cli
        .table_name
        .clone()
        .unwrap_or_else(|| format!("benchmark_table_{}", random_suffix(5)));
    let backend: DbBackend = cli.db.parse()?;
    let mut db = backend.build(dim, &config, &db_name, &table_name)?;
    println!("  Database: {}  Table: {}.{}", db.name(), db_name, table_name);

    let mut plan = CasePlan {
        k: cli.k,
        normalize: !cli.no_normalize && must_normalize(metric, &*db),
        load: !cli.skip_load,
        serial_search: !cli.skip_serial,
        parallel_search: !cli.skip_parallel,
        load_timeout: Some(
            cli.load_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| CaseTimeouts::load_phase(dim, size)),
        ),
        search_timeout: cli.search_timeout_secs.map(Duration::from_secs),
        ..CasePlan::default()
    };
    if let Some(concurrency) = cli.concurrency {
        plan.concurrency = concurrency.max(1);
    }

    let result = CaseRunner::new(&mut *db, source.as_ref(), &queries, config.clone(), plan)
        .with_dataset_name(dataset_name)
        .run();

    report::print_case(&result);

    if cli.export {
        println!("\n{}", "── Export ──".bold().yellow());
        report::export_all(std::slice::from_ref(&result), &config.results_local_dir)?;
    }

    println!("\n{}", "Benchmark complete.".bold().green());
    Ok(())
}
