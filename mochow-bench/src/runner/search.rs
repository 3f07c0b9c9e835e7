use super::{join_failure, search_queries, RunState, SearchOutcome};
use crate::dataset::QuerySet;
use crate::db::{Filters, VectorDb};
use crate::worker::WorkerGroup;
use crate::BenchResult;
use std::time::Duration;

const WORKER_NAME: &str = "search-0";

/// Replays a query set one query at a time in a single worker.
pub struct SerialSearchRunner<'a> {
    db: &'a mut dyn VectorDb,
    queries: &'a QuerySet,
    k: usize,
    filters: Option<Filters>,
    timeout: Option<Duration>,
    state: RunState,
    worker_pids: Vec<i32>,
}

impl<'a> SerialSearchRunner<'a> {
    pub fn new(db: &'a mut dyn VectorDb, queries: &'a QuerySet, k: usize) -> Self {
        Self {
            db,
            queries,
            k,
            filters: None,
            timeout: None,
            state: RunState::Idle,
            worker_pids: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Option<Filters>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn worker_pids(&self) -> &[i32] {
        &self.worker_pids
    }

    pub fn run(&mut self) -> BenchResult<SearchOutcome> {
        self.state = RunState::Running;
        self.worker_pids.clear();

        let mut group = WorkerGroup::<SearchOutcome>::new();
        let db = &mut *self.db;
        let queries = self.queries;
        let k = self.k;
        let filters = self.filters.as_ref();
        let spawned = group.spawn(WORKER_NAME, move || {
            search_queries(
                db,
                &queries.queries,
                &queries.ground_truth,
                k,
                filters,
                WORKER_NAME,
            )
        });
        match spawned {
            Ok(pid) => self.worker_pids.push(pid),
            Err(e) => {
                self.state = RunState::Failed;
                return Err(e);
            }
        }

        match group.join(self.timeout) {
            Ok(mut outcomes) => match outcomes.pop() {
                Some(outcome) => {
                    self.state = RunState::Completed;
                    Ok(outcome)
                }
                None => {
                    self.state = RunState::Failed;
                    Err(crate::BenchError::Spawn("search worker returned nothing".into()))
                }
            },
            Err(e) => {
                let (state, err) = join_failure(e, "serial search", self.timeout);
                self.state = state;
                Err(err)
            }
        }
    }
}
