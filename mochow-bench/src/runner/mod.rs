//! Workload runners.
//!
//! Each runner hands its workload to forked workers (see [`crate::worker`])
//! and only aggregates in the driver process. A runner moves through
//! [`RunState`] on every `run()`:
//!
//! ```text
//! Idle ──► Running ──► Completed
//!                 ├──► TimedOut   (workers killed)
//!                 └──► Failed     (workers killed)
//! ```

mod insert;
mod parallel;
mod search;

pub use insert::SerialInsertRunner;
pub use parallel::{ParallelOutcome, ParallelSearchRunner};
pub use search::SerialSearchRunner;

use crate::db::{Filters, VectorDb};
use crate::metric::{self, LatencyRecorder};
use crate::worker::JoinError;
use crate::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

const SEARCH_PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::TimedOut | RunState::Failed
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::TimedOut => "timed_out",
            RunState::Failed => "failed",
        })
    }
}

/// Result of one insertion run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsertOutcome {
    pub count: usize,
    #[serde(with = "crate::metric::duration_secs")]
    pub elapsed: Duration,
}

/// Result of replaying a query set in one worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Mean per-query recall.
    pub recall: f64,
    #[serde(with = "crate::metric::duration_secs")]
    pub p99_latency: Duration,
    #[serde(with = "crate::metric::duration_secs")]
    pub avg_latency: Duration,
    pub total_queries: usize,
    /// Wall-clock time from the first query to the last answer.
    #[serde(with = "crate::metric::duration_secs")]
    pub elapsed: Duration,
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Replay `queries` against `db`, in order, scoring each against the first
/// `k` entries of the matching `ground_truth` row.
///
/// Runs inside a worker: `init` and `connect` first, `disconnect` last. Any
/// search error aborts the replay.
pub(crate) fn search_queries(
    db: &mut dyn VectorDb,
    queries: &[Vec<f32>],
    ground_truth: &[Vec<i64>],
    k: usize,
    filters: Option<&Filters>,
    worker: &str,
) -> BenchResult<SearchOutcome> {
    tracing::info!(worker, queries = queries.len(), k, "start searching the query set");
    db.init()?;
    db.connect()?;

    let mut latencies = LatencyRecorder::with_capacity(queries.len());
    let mut recalls = Vec::with_capacity(queries.len());
    let start = Instant::now();
    for (idx, query) in queries.iter().enumerate() {
        let truth = ground_truth
            .get(idx)
            .ok_or_else(|| BenchError::Workload(format!("no ground truth for query {idx}")))?;

        let t = latencies.start();
        let ids = db.search_embedding(query, k, filters).map_err(|e| {
            tracing::warn!(worker, query = idx, error = %e, "search_embedding failed");
            e
        })?;
        let latency = latencies.record(t);

        let r = metric::recall(k, &truth[..k.min(truth.len())], &ids);
        recalls.push(r);

        if (idx + 1) % SEARCH_PROGRESS_EVERY == 0 {
            tracing::info!(
                worker,
                search_count = idx + 1,
                latest_latency = metric::round4(latency),
                latest_recall = metric::round4(r),
                "search progress"
            );
        }
    }
    let elapsed = start.elapsed();
    db.disconnect()?;

    let outcome = SearchOutcome {
        recall: metric::mean(&recalls),
        p99_latency: latencies.percentile(99.0),
        avg_latency: latencies.mean(),
        total_queries: queries.len(),
        elapsed,
    };
    tracing::info!(
        worker,
        cost = metric::round4(latencies.total().as_secs_f64()),
        queries = outcome.total_queries,
        avg_recall = metric::round4(outcome.recall),
        avg_latency = metric::round4(outcome.avg_latency.as_secs_f64()),
        p99 = metric::round4(outcome.p99_latency.as_secs_f64()),
        "searched the query set"
    );
    Ok(outcome)
}

/// Translate a failed join into the runner's error and terminal state.
fn join_failure(err: JoinError, what: &str, timeout: Option<Duration>) -> (RunState, BenchError) {
    match err {
        JoinError::TimedOut => {
            let msg = format!(
                "{what} timed out after {:.1}s",
                timeout.unwrap_or_default().as_secs_f64()
            );
            tracing::warn!("{msg}");
            (RunState::TimedOut, BenchError::PerformanceTimeout(msg))
        }
        JoinError::Failed(e) => {
            tracing::warn!(error = %e, "{what} failed");
            (RunState::Failed, e)
        }
    }
}
