//! One benchmark case: load, serial search, parallel search.

use crate::config::BenchConfig;
use crate::dataset::{DatasetSource, QuerySet};
use crate::db::{Filters, VectorDb};
use crate::metric::Metric;
use crate::runner::{
    ParallelOutcome, ParallelSearchRunner, SearchOutcome, SerialInsertRunner, SerialSearchRunner,
};
use crate::BenchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which phases to run and how.
#[derive(Debug, Clone)]
pub struct CasePlan {
    pub k: usize,
    pub concurrency: usize,
    /// L2-normalize train vectors before insertion.
    pub normalize: bool,
    pub load: bool,
    pub serial_search: bool,
    pub parallel_search: bool,
    pub load_timeout: Option<Duration>,
    pub search_timeout: Option<Duration>,
    pub filters: Option<Filters>,
}

impl Default for CasePlan {
    fn default() -> Self {
        Self {
            k: 100,
            concurrency: num_cpus::get(),
            normalize: true,
            load: true,
            serial_search: true,
            parallel_search: true,
            load_timeout: None,
            search_timeout: None,
            filters: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum PhaseStatus {
    Completed,
    /// Deadline exceeded; reported as "did not finish".
    TimedOut,
    Failed(String),
    Skipped,
}

impl PhaseStatus {
    fn from_error(err: &BenchError) -> Self {
        if err.is_timeout() {
            PhaseStatus::TimedOut
        } else {
            PhaseStatus::Failed(err.to_string())
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PhaseStatus::Completed)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Completed => f.write_str("completed"),
            PhaseStatus::TimedOut => f.write_str("did not finish"),
            PhaseStatus::Failed(msg) => write!(f, "failed: {msg}"),
            PhaseStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// Everything a case produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub db_name: String,
    pub dataset: String,
    pub metric: Metric,
    pub load: PhaseStatus,
    pub serial_search: PhaseStatus,
    pub parallel_search: PhaseStatus,
    pub serial: Option<SearchOutcome>,
    pub parallel: Option<ParallelOutcome>,
}

pub struct CaseRunner<'a> {
    db: &'a mut dyn VectorDb,
    dataset: &'a dyn DatasetSource,
    queries: &'a QuerySet,
    dataset_name: String,
    config: BenchConfig,
    plan: CasePlan,
}

impl<'a> CaseRunner<'a> {
    pub fn new(
        db: &'a mut dyn VectorDb,
        dataset: &'a dyn DatasetSource,
        queries: &'a QuerySet,
        config: BenchConfig,
        plan: CasePlan,
    ) -> Self {
        Self {
            db,
            dataset,
            queries,
            dataset_name: String::new(),
            config,
            plan,
        }
    }

    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.dataset_name = name.into();
        self
    }

    /// Run the planned phases in order, filling the metric as each one
    /// completes. A load that does not complete skips both search phases.
    pub fn run(self) -> CaseResult {
        let CaseRunner {
            db,
            dataset,
            queries,
            dataset_name,
            config,
            plan,
        } = self;

        let mut result = CaseResult {
            db_name: db.name().to_string(),
            dataset: dataset_name,
            metric: Metric::default(),
            load: PhaseStatus::Skipped,
            serial_search: PhaseStatus::Skipped,
            parallel_search: PhaseStatus::Skipped,
            serial: None,
            parallel: None,
        };
        tracing::info!(db = %result.db_name, dataset = %result.dataset, "case started");

        if plan.load {
            let mut runner = SerialInsertRunner::new(&mut *db, dataset, config)
                .with_normalize(plan.normalize)
                .with_timeout(plan.load_timeout);
            match runner.run() {
                Ok(outcome) => {
                    result.metric.max_load_count = outcome.count;
                    result.metric.load_duration = outcome.elapsed;
                    result.load = PhaseStatus::Completed;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "load phase did not complete");
                    result.load = PhaseStatus::from_error(&e);
                    return result;
                }
            }
        }

        if plan.serial_search {
            let mut runner = SerialSearchRunner::new(&mut *db, queries, plan.k)
                .with_filters(plan.filters.clone())
                .with_timeout(plan.search_timeout);
            match runner.run() {
                Ok(outcome) => {
                    result.metric.serial_latency_p99 = outcome.p99_latency;
                    result.metric.recall = outcome.recall;
                    result.serial = Some(outcome);
                    result.serial_search = PhaseStatus::Completed;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "serial search did not complete");
                    result.serial_search = PhaseStatus::from_error(&e);
                }
            }
        }

        if plan.parallel_search {
            let mut runner = ParallelSearchRunner::new(&mut *db, queries, plan.k)
                .with_concurrency(plan.concurrency)
                .with_filters(plan.filters.clone())
                .with_timeout(plan.search_timeout);
            match runner.run() {
                Ok(outcome) => {
                    result.metric.qps = outcome.qps;
                    if !result.serial_search.is_completed() {
                        result.metric.recall = outcome.recall;
                    }
                    result.parallel = Some(outcome);
                    result.parallel_search = PhaseStatus::Completed;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "parallel search did not complete");
                    result.parallel_search = PhaseStatus::from_error(&e);
                }
            }
        }

        tracing::info!(db = %result.db_name, metric = ?result.metric, "case finished");
        result
    }
}
