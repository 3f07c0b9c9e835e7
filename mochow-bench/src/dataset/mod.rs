//! Dataset sources: the vectors to load and the queries to replay.

#[cfg(feature = "hdf5")]
pub mod h5;
pub mod synthetic;
pub mod vecs;

use crate::config::BenchConfig;
use crate::db::MetricType;
use crate::metric::numerize;
use crate::{BenchError, BenchResult};
use std::ops::Range;
use std::path::{Path, PathBuf};

pub type Batch = Vec<Vec<f32>>;
pub type BatchIter<'a> = Box<dyn Iterator<Item = BenchResult<Batch>> + 'a>;

/// Ordered embedding vectors to insert.
pub trait DatasetSource {
    /// Rows yielded by a full pass of [`DatasetSource::batches`].
    fn total_size(&self) -> usize;
    fn dim(&self) -> usize;
    /// A fresh pass over all rows in `batch_size` chunks.
    fn batches(&self, batch_size: usize) -> BenchResult<BatchIter<'_>>;
}

fn check_batch_size(batch_size: usize) -> BenchResult<()> {
    if batch_size == 0 {
        return Err(BenchError::Config("batch size must be positive".into()));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// In-memory source
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

impl InMemoryDataset {
    pub fn new(dim: usize, vectors: Vec<Vec<f32>>) -> Self {
        Self { dim, vectors }
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

impl DatasetSource for InMemoryDataset {
    fn total_size(&self) -> usize {
        self.vectors.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn batches(&self, batch_size: usize) -> BenchResult<BatchIter<'_>> {
        check_batch_size(batch_size)?;
        Ok(Box::new(
            self.vectors.chunks(batch_size).map(|chunk| Ok(chunk.to_vec())),
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Query set
// ────────────────────────────────────────────────────────────────────────────────

/// Query vectors paired by index with their true nearest neighbours.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    pub queries: Vec<Vec<f32>>,
    pub ground_truth: Vec<Vec<i64>>,
}

impl QuerySet {
    pub fn new(queries: Vec<Vec<f32>>, ground_truth: Vec<Vec<i64>>) -> Self {
        Self {
            queries,
            ground_truth,
        }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Split `len` items into at most `n` contiguous, non-empty ranges whose
/// sizes differ by at most one. The first `len % n` ranges get the extra
/// item.
pub fn shard_ranges(len: usize, n: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let base = len / n;
    let extra = len % n;
    let mut ranges = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let size = base + usize::from(i < extra);
        if size == 0 {
            break;
        }
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

// ────────────────────────────────────────────────────────────────────────────────
// Published datasets
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Cohere,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Cohere => "Cohere",
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            Dataset::Cohere => 768,
        }
    }

    pub fn metric_type(&self) -> MetricType {
        match self {
            Dataset::Cohere => MetricType::Cosine,
        }
    }

    pub fn sizes(&self) -> &'static [(usize, &'static str)] {
        match self {
            Dataset::Cohere => &[
                (100_000, "SMALL"),
                (1_000_000, "MEDIUM"),
                (10_000_000, "LARGE"),
            ],
        }
    }

    pub fn size_label(&self, size: usize) -> Option<&'static str> {
        self.sizes()
            .iter()
            .find(|(s, _)| *s == size)
            .map(|(_, label)| *label)
    }

    pub fn manager(&self, size: usize, config: &BenchConfig) -> BenchResult<DatasetManager> {
        let label = self.size_label(size).ok_or_else(|| {
            let supported: Vec<usize> = self.sizes().iter().map(|(s, _)| *s).collect();
            BenchError::Config(format!(
                "size {size} not supported for {}, expected one of {supported:?}",
                self.name()
            ))
        })?;
        Ok(DatasetManager {
            dataset: *self,
            label,
            size,
            root: config.dataset_local_dir.clone(),
            use_shuffled: config.use_shuffled_data,
        })
    }
}

/// File-backed dataset of one published size.
///
/// Missing or malformed files are logged and read as empty, so a case with
/// no data loads nothing and replays no queries rather than aborting.
#[derive(Debug, Clone)]
pub struct DatasetManager {
    dataset: Dataset,
    label: &'static str,
    size: usize,
    root: PathBuf,
    use_shuffled: bool,
}

impl DatasetManager {
    pub fn dataset(&self) -> Dataset {
        self.dataset
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Declared size of the published dataset.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dir_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.dataset.name(),
            self.label,
            numerize(self.size as u64)
        )
        .to_lowercase()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root
            .join(self.dataset.name().to_lowercase())
            .join(self.dir_name())
    }

    /// Create the data directory if it does not exist yet.
    pub fn prepare(&self) -> BenchResult<()> {
        let dir = self.data_dir();
        if !dir.exists() {
            tracing::info!(path = %dir.display(), "local dataset path does not exist, creating it");
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn train_path(&self) -> PathBuf {
        let dir = self.data_dir();
        let shuffled = dir.join("shuffle_train.fvecs");
        if self.use_shuffled && shuffled.exists() {
            shuffled
        } else {
            dir.join("train.fvecs")
        }
    }

    /// The single-file HDF5 bundle, when present and supported.
    #[cfg(feature = "hdf5")]
    fn bundle(&self) -> Option<h5::Hdf5Bundle> {
        let path = self.data_dir().join(h5::FILE_NAME);
        if !path.exists() {
            return None;
        }
        match h5::Hdf5Bundle::open(&path) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable hdf5 bundle, falling back to vecs files");
                None
            }
        }
    }

    pub fn test_data(&self) -> Vec<Vec<f32>> {
        #[cfg(feature = "hdf5")]
        if let Some(bundle) = self.bundle() {
            return bundle_or_empty(bundle.read_all(h5::TEST));
        }
        read_or_empty(&self.data_dir().join("test.fvecs"))
    }

    pub fn neighbors(&self) -> Vec<Vec<i64>> {
        #[cfg(feature = "hdf5")]
        if let Some(bundle) = self.bundle() {
            return bundle_or_empty(bundle.read_all(h5::NEIGHBORS));
        }
        read_or_empty::<i32>(&self.data_dir().join("neighbors.ivecs"))
            .into_iter()
            .map(|row| row.into_iter().map(i64::from).collect())
            .collect()
    }

    pub fn query_set(&self) -> QuerySet {
        QuerySet::new(self.test_data(), self.neighbors())
    }
}

impl DatasetSource for DatasetManager {
    fn total_size(&self) -> usize {
        #[cfg(feature = "hdf5")]
        if let Some(bundle) = self.bundle() {
            return bundle.shape(h5::TRAIN).map(|(rows, _)| rows).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "unreadable train dataset");
                0
            });
        }
        let path = self.train_path();
        if !path.exists() {
            return 0;
        }
        match vecs::shape(&path) {
            Ok((rows, _)) => rows,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable train file");
                0
            }
        }
    }

    fn dim(&self) -> usize {
        self.dataset.dim()
    }

    fn batches(&self, batch_size: usize) -> BenchResult<BatchIter<'_>> {
        check_batch_size(batch_size)?;
        #[cfg(feature = "hdf5")]
        if let Some(bundle) = self.bundle() {
            tracing::info!(batch_size, "streaming train vectors from hdf5 bundle");
            return bundle.train_batches(batch_size);
        }
        let path = self.train_path();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "no such file");
            return Ok(Box::new(std::iter::empty()));
        }
        tracing::info!(path = %path.display(), batch_size, "streaming train vectors");
        let rows = vecs::VecsReader::<f32>::open(&path)?;
        Ok(Box::new(vecs::VecsBatches::new(rows, batch_size)))
    }
}

fn read_or_empty<T: vecs::VecsElement>(path: &Path) -> Vec<Vec<T>> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no such file");
        return Vec::new();
    }
    tracing::info!(path = %path.display(), "reading entire file into memory");
    match vecs::read_all(path) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed file, using empty data");
            Vec::new()
        }
    }
}

#[cfg(feature = "hdf5")]
fn bundle_or_empty<T>(rows: BenchResult<Vec<Vec<T>>>) -> Vec<Vec<T>> {
    rows.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "malformed hdf5 dataset, using empty data");
        Vec::new()
    })
}
