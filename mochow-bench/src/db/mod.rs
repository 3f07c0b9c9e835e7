//! Vector database capability and backend selection.

pub mod mochow;

use crate::config::BenchConfig;
use crate::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Backend-specific search filter expression.
pub type Filters = serde_json::Map<String, Value>;

/// One database client as driven by the runners.
///
/// A handle is built once per case in the driver and then copied into each
/// worker process by `fork`. Every worker calls [`VectorDb::init`] before any
/// other operation, so implementations must not assume state set up by the
/// driver survives beyond plain configuration.
pub trait VectorDb: Send {
    fn name(&self) -> &str;

    /// Create the database/table if absent. Called once per worker.
    fn init(&mut self) -> BenchResult<()>;

    /// Remove a table left over from an earlier run. Called by the insertion
    /// worker before `init` when `drop_old` is set.
    fn drop_old(&mut self) -> BenchResult<()> {
        Ok(())
    }

    fn connect(&mut self) -> BenchResult<()>;
    fn disconnect(&mut self) -> BenchResult<()>;

    /// Insert one batch; `ids` run parallel to `embeddings`. `last_batch` is
    /// set exactly once, on the final batch of a load.
    fn insert_embeddings(
        &mut self,
        embeddings: &[Vec<f32>],
        ids: &[i64],
        last_batch: bool,
    ) -> BenchResult<usize>;

    /// Ids of the (approximately) `k` nearest stored vectors, best first.
    fn search_embedding(
        &mut self,
        query: &[f32],
        k: usize,
        filters: Option<&Filters>,
    ) -> BenchResult<Vec<i64>>;

    /// Whether the caller must L2-normalize vectors of a COSINE dataset.
    fn need_normalize_cosine(&self) -> bool {
        false
    }
}

impl<T: VectorDb + ?Sized> VectorDb for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn init(&mut self) -> BenchResult<()> {
        (**self).init()
    }
    fn drop_old(&mut self) -> BenchResult<()> {
        (**self).drop_old()
    }
    fn connect(&mut self) -> BenchResult<()> {
        (**self).connect()
    }
    fn disconnect(&mut self) -> BenchResult<()> {
        (**self).disconnect()
    }
    fn insert_embeddings(
        &mut self,
        embeddings: &[Vec<f32>],
        ids: &[i64],
        last_batch: bool,
    ) -> BenchResult<usize> {
        (**self).insert_embeddings(embeddings, ids, last_batch)
    }
    fn search_embedding(
        &mut self,
        query: &[f32],
        k: usize,
        filters: Option<&Filters>,
    ) -> BenchResult<Vec<i64>> {
        (**self).search_embedding(query, k, filters)
    }
    fn need_normalize_cosine(&self) -> bool {
        (**self).need_normalize_cosine()
    }
}

/// Whether vectors of a `metric` dataset must be L2-normalized before `db`
/// ingests them.
pub fn must_normalize(metric: MetricType, db: &dyn VectorDb) -> bool {
    metric == MetricType::Cosine && db.need_normalize_cosine()
}

// ────────────────────────────────────────────────────────────────────────────────
// Metric / index enums
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    #[default]
    L2,
    #[serde(rename = "COSINE")]
    Cosine,
    #[serde(rename = "IP")]
    Ip,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::Cosine => "COSINE",
            MetricType::Ip => "IP",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Ok(MetricType::L2),
            "COSINE" => Ok(MetricType::Cosine),
            "IP" => Ok(MetricType::Ip),
            other => Err(BenchError::Config(format!("unknown metric type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexType {
    #[default]
    Hnsw,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Hnsw => "HNSW",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Backend selection
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbBackend {
    Mochow,
}

impl DbBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbBackend::Mochow => "mochow",
        }
    }

    /// Build a client handle for a table of `dim`-dimensional vectors.
    pub fn build(
        &self,
        dim: usize,
        config: &BenchConfig,
        db_name: &str,
        table_name: &str,
    ) -> BenchResult<Box<dyn VectorDb>> {
        match self {
            DbBackend::Mochow => {
                config.mochow.validate()?;
                Ok(Box::new(mochow::Mochow::new(
                    dim,
                    config.mochow.clone(),
                    config.hnsw.clone(),
                    db_name,
                    table_name,
                )))
            }
        }
    }
}

impl FromStr for DbBackend {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mochow" => Ok(DbBackend::Mochow),
            other => Err(BenchError::Config(format!("unknown database backend: {other}"))),
        }
    }
}

impl fmt::Display for DbBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_type_parses_case_insensitively() {
        assert_eq!("cosine".parse::<MetricType>().unwrap(), MetricType::Cosine);
        assert_eq!("L2".parse::<MetricType>().unwrap(), MetricType::L2);
        assert!("hamming".parse::<MetricType>().is_err());
    }

    #[test]
    fn backend_from_str() {
        assert_eq!("Mochow".parse::<DbBackend>().unwrap(), DbBackend::Mochow);
        assert!(matches!("milvus".parse::<DbBackend>(), Err(BenchError::Config(_))));
    }

    #[test]
    fn only_cosine_data_is_normalized_for_mochow() {
        let db = mochow::Mochow::new(
            8,
            Default::default(),
            Default::default(),
            "d",
            "t",
        );
        assert!(must_normalize(MetricType::Cosine, &db));
        assert!(!must_normalize(MetricType::L2, &db));
        assert!(!must_normalize(MetricType::Ip, &db));
    }

    #[test]
    fn build_rejects_missing_credentials() {
        let mut config = BenchConfig::default();
        config.mochow.api_key.clear();
        assert!(matches!(
            DbBackend::Mochow.build(768, &config, "db", "table"),
            Err(BenchError::Config(_))
        ));
    }
}
