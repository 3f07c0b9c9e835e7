use super::{join_failure, l2_normalize, InsertOutcome, RunState};
use crate::config::BenchConfig;
use crate::dataset::DatasetSource;
use crate::db::VectorDb;
use crate::worker::WorkerGroup;
use crate::BenchResult;
use std::time::{Duration, Instant};

const WORKER_NAME: &str = "insert-0";
const LOAD_PROGRESS_EVERY: usize = 100_000;

/// Loads a whole dataset through one worker, batch by batch.
pub struct SerialInsertRunner<'a> {
    db: &'a mut dyn VectorDb,
    dataset: &'a dyn DatasetSource,
    config: BenchConfig,
    normalize: bool,
    timeout: Option<Duration>,
    state: RunState,
    worker_pids: Vec<i32>,
}

impl<'a> SerialInsertRunner<'a> {
    pub fn new(db: &'a mut dyn VectorDb, dataset: &'a dyn DatasetSource, config: BenchConfig) -> Self {
        Self {
            db,
            dataset,
            config,
            normalize: false,
            timeout: None,
            state: RunState::Idle,
            worker_pids: Vec::new(),
        }
    }

    /// L2-normalize every vector before inserting it.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Deadline for the whole load; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Pids of the workers forked by the last `run()`.
    pub fn worker_pids(&self) -> &[i32] {
        &self.worker_pids
    }

    /// Insert every batch of the dataset and return how many rows went in.
    ///
    /// Fails with [`crate::BenchError::PerformanceTimeout`] once the deadline
    /// passes; the worker has been killed by then.
    pub fn run(&mut self) -> BenchResult<InsertOutcome> {
        self.state = RunState::Running;
        self.worker_pids.clear();
        let start = Instant::now();

        let mut group = WorkerGroup::<usize>::new();
        let db = &mut *self.db;
        let dataset = self.dataset;
        let config = &self.config;
        let normalize = self.normalize;
        let spawned = group.spawn(WORKER_NAME, move || {
            insert_all(db, dataset, config, normalize)
        });
        match spawned {
            Ok(pid) => self.worker_pids.push(pid),
            Err(e) => {
                self.state = RunState::Failed;
                return Err(e);
            }
        }

        match group.join(self.timeout) {
            Ok(counts) => {
                let outcome = InsertOutcome {
                    count: counts.into_iter().sum(),
                    elapsed: start.elapsed(),
                };
                self.state = RunState::Completed;
                tracing::info!(
                    count = outcome.count,
                    elapsed_s = outcome.elapsed.as_secs_f64(),
                    "load finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                let (state, err) = join_failure(e, "VectorDB load dataset", self.timeout);
                self.state = state;
                Err(err)
            }
        }
    }
}

/// Worker body: drop/init, warm up, then stream batches in order.
fn insert_all(
    db: &mut dyn VectorDb,
    dataset: &dyn DatasetSource,
    config: &BenchConfig,
    normalize: bool,
) -> BenchResult<usize> {
    tracing::info!(
        worker = WORKER_NAME,
        batch = config.num_per_batch,
        "start inserting embeddings"
    );
    if config.drop_old {
        db.drop_old()?;
    }
    db.init()?;
    if !config.warmup_delay.is_zero() {
        tracing::debug!(delay = ?config.warmup_delay, "waiting for the table to settle");
        std::thread::sleep(config.warmup_delay);
    }

    let total = dataset.total_size();
    let start = Instant::now();
    let mut count = 0usize;
    for batch in dataset.batches(config.num_per_batch)? {
        let mut batch = batch?;
        if normalize {
            batch.iter_mut().for_each(|v| l2_normalize(v));
        }
        let ids: Vec<i64> = (count..count + batch.len()).map(|i| i as i64).collect();
        let last_batch = count + batch.len() == total;
        db.insert_embeddings(&batch, &ids, last_batch)?;

        let before = count;
        count += batch.len();
        if count / LOAD_PROGRESS_EVERY > before / LOAD_PROGRESS_EVERY {
            tracing::info!(worker = WORKER_NAME, count, "loaded embeddings");
        }
    }
    tracing::info!(
        worker = WORKER_NAME,
        count,
        dur_s = start.elapsed().as_secs_f64(),
        "finished loading the dataset"
    );
    Ok(count)
}
