//! Benchmark execution engine for vector databases.
//!
//! A case loads a dataset into a [`db::VectorDb`], replays the query set
//! serially and then concurrently, and reports a [`metric::Metric`]. Every
//! workload phase runs in a forked worker process (see [`worker`]) so that a
//! hung or crashing client can be killed without taking the driver down.

pub mod case;
pub mod config;
pub mod dataset;
pub mod db;
pub mod metric;
pub mod report;
pub mod runner;
pub mod worker;

pub use case::{CasePlan, CaseResult, CaseRunner, PhaseStatus};
pub use config::BenchConfig;
pub use dataset::{DatasetSource, InMemoryDataset, QuerySet};
pub use db::{Filters, VectorDb};
pub use metric::Metric;
pub use runner::{
    InsertOutcome, ParallelOutcome, ParallelSearchRunner, RunState, SearchOutcome,
    SerialInsertRunner, SerialSearchRunner,
};

// ────────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────────

pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by the database client during init/connect/insert/search.
    #[error("workload error: {0}")]
    Workload(String),

    #[error("config error: {0}")]
    Config(String),

    /// Malformed dataset file.
    #[error("data error: {0}")]
    Data(String),

    /// A workload exceeded its deadline and its worker was killed.
    #[error("performance timeout: {0}")]
    PerformanceTimeout(String),

    /// The worker exited without reporting a result.
    #[error("worker {name} exited without a result ({status})")]
    WorkerCrashed { name: String, status: String },

    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BenchError {
    /// Is this the "did not finish" outcome rather than a failure?
    pub fn is_timeout(&self) -> bool {
        matches!(self, BenchError::PerformanceTimeout(_))
    }

    /// Message shipped from a worker back to its parent. Workload errors keep
    /// their bare message so the parent can re-wrap them without nesting.
    pub(crate) fn into_worker_message(self) -> String {
        match self {
            BenchError::Workload(msg) => msg,
            other => other.to_string(),
        }
    }
}

impl From<mochow_client::ClientError> for BenchError {
    fn from(e: mochow_client::ClientError) -> Self {
        BenchError::Workload(e.to_string())
    }
}
