use super::{join_failure, search_queries, RunState, SearchOutcome};
use crate::dataset::{shard_ranges, QuerySet};
use crate::db::{Filters, VectorDb};
use crate::metric;
use crate::worker::WorkerGroup;
use crate::BenchResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Aggregate of all search workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelOutcome {
    /// Total queries over the slowest worker's elapsed time.
    pub qps: f64,
    /// Shard-size-weighted mean recall.
    pub recall: f64,
    /// Worst per-worker p99.
    #[serde(with = "crate::metric::duration_secs")]
    pub p99_latency: Duration,
    pub total_queries: usize,
    #[serde(with = "crate::metric::duration_secs")]
    pub elapsed: Duration,
    pub shard_sizes: Vec<usize>,
}

impl ParallelOutcome {
    fn aggregate(outcomes: &[SearchOutcome]) -> Self {
        let total_queries: usize = outcomes.iter().map(|o| o.total_queries).sum();
        let elapsed = outcomes
            .iter()
            .map(|o| o.elapsed)
            .max()
            .unwrap_or_default();
        let qps = if elapsed.is_zero() {
            0.0
        } else {
            total_queries as f64 / elapsed.as_secs_f64()
        };
        let recall = if total_queries == 0 {
            0.0
        } else {
            outcomes
                .iter()
                .map(|o| o.recall * o.total_queries as f64)
                .sum::<f64>()
                / total_queries as f64
        };
        let p99_latency = outcomes
            .iter()
            .map(|o| o.p99_latency)
            .max()
            .unwrap_or_default();
        Self {
            qps,
            recall,
            p99_latency,
            total_queries,
            elapsed,
            shard_sizes: outcomes.iter().map(|o| o.total_queries).collect(),
        }
    }
}

/// Replays a query set sharded across concurrent workers.
pub struct ParallelSearchRunner<'a> {
    db: &'a mut dyn VectorDb,
    queries: &'a QuerySet,
    k: usize,
    concurrency: usize,
    filters: Option<Filters>,
    timeout: Option<Duration>,
    state: RunState,
    worker_pids: Vec<i32>,
}

impl<'a> ParallelSearchRunner<'a> {
    /// One worker per CPU unless [`Self::with_concurrency`] says otherwise.
    pub fn new(db: &'a mut dyn VectorDb, queries: &'a QuerySet, k: usize) -> Self {
        Self {
            db,
            queries,
            k,
            concurrency: num_cpus::get(),
            filters: None,
            timeout: None,
            state: RunState::Idle,
            worker_pids: Vec::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_filters(mut self, filters: Option<Filters>) -> Self {
        self.filters = filters;
        self
    }

    /// Shared deadline for all workers.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn worker_pids(&self) -> &[i32] {
        &self.worker_pids
    }

    pub fn run(&mut self) -> BenchResult<ParallelOutcome> {
        self.state = RunState::Running;
        self.worker_pids.clear();

        let shards = shard_ranges(self.queries.len(), self.concurrency);
        tracing::info!(
            workers = shards.len(),
            queries = self.queries.len(),
            "start parallel search"
        );

        let mut group = WorkerGroup::<SearchOutcome>::new();
        let query_set = self.queries;
        let gt_len = query_set.ground_truth.len();
        for (i, range) in shards.into_iter().enumerate() {
            let name = format!("search-{i}");
            let db = &mut *self.db;
            let queries = &query_set.queries[range.clone()];
            // Rows past the end surface as a missing-ground-truth error in the worker.
            let ground_truth =
                &query_set.ground_truth[range.start.min(gt_len)..range.end.min(gt_len)];
            let k = self.k;
            let filters = self.filters.as_ref();
            let worker = name.clone();
            let spawned = group.spawn(name, move || {
                search_queries(db, queries, ground_truth, k, filters, &worker)
            });
            match spawned {
                Ok(pid) => self.worker_pids.push(pid),
                Err(e) => {
                    // Dropping the group kills the workers already forked.
                    self.state = RunState::Failed;
                    return Err(e);
                }
            }
        }

        match group.join(self.timeout) {
            Ok(outcomes) => {
                let outcome = ParallelOutcome::aggregate(&outcomes);
                self.state = RunState::Completed;
                tracing::info!(
                    qps = metric::round4(outcome.qps),
                    recall = metric::round4(outcome.recall),
                    p99 = metric::round4(outcome.p99_latency.as_secs_f64()),
                    queries = outcome.total_queries,
                    "parallel search finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                let (state, err) = join_failure(e, "parallel search", self.timeout);
                self.state = state;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(recall: f64, queries: usize, elapsed_ms: u64, p99_ms: u64) -> SearchOutcome {
        SearchOutcome {
            recall,
            p99_latency: Duration::from_millis(p99_ms),
            avg_latency: Duration::from_millis(1),
            total_queries: queries,
            elapsed: Duration::from_millis(elapsed_ms),
        }
    }

    #[test]
    fn aggregate_weights_recall_by_shard_size() {
        let agg = ParallelOutcome::aggregate(&[
            outcome(1.0, 30, 1000, 5),
            outcome(0.0, 10, 2000, 9),
        ]);
        assert_eq!(agg.total_queries, 40);
        assert!((agg.recall - 0.75).abs() < 1e-12);
        assert!((agg.qps - 20.0).abs() < 1e-9);
        assert_eq!(agg.p99_latency, Duration::from_millis(9));
        assert_eq!(agg.elapsed, Duration::from_secs(2));
        assert_eq!(agg.shard_sizes, [30, 10]);
    }

    #[test]
    fn aggregate_of_nothing_is_zero() {
        let agg = ParallelOutcome::aggregate(&[]);
        assert_eq!(agg.qps, 0.0);
        assert_eq!(agg.recall, 0.0);
        assert_eq!(agg.total_queries, 0);
    }
}
