//! Mochow backend.
//!
//! Rows are `{id: UINT64 auto-increment, vector: FLOAT_VECTOR}` in a single
//! hash partition. The HNSW index is created with `autoBuild: false` and
//! rebuilt once after the last batch; the load only counts as finished when
//! the index reports `NORMAL`.

use super::{Filters, IndexType, MetricType, VectorDb};
use crate::{BenchError, BenchResult};
use mochow_client::model::{
    AnnParams, AnnSearch, CreateTableRequest, FieldSchema, IndexSchema, Partition, TableSchema,
};
use mochow_client::{ClientConfig, MochowClient};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const PRIMARY_FIELD: &str = "id";
const VECTOR_FIELD: &str = "vector";
const INDEX_NAME: &str = "vector_idx";
const INDEX_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DROP_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DROP_POLL_ATTEMPTS: usize = 120;

// ────────────────────────────────────────────────────────────────────────────────
// Config
// ────────────────────────────────────────────────────────────────────────────────

/// Connection settings for one Mochow deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MochowConfig {
    pub host: String,
    pub account: String,
    pub api_key: String,
    /// Free-form label for the deployment shape, e.g. `4c16g`.
    pub db_label: String,
}

impl Default for MochowConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:8511".into(),
            account: "root".into(),
            api_key: String::new(),
            db_label: String::new(),
        }
    }
}

impl MochowConfig {
    /// Every field except `db_label` must be non-empty.
    pub fn validate(&self) -> BenchResult<()> {
        for (name, value) in [
            ("host", &self.host),
            ("account", &self.account),
            ("api_key", &self.api_key),
        ] {
            if value.is_empty() {
                return Err(BenchError::Config(format!("mochow.{name} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.host, &self.account, &self.api_key)
    }
}

/// HNSW build and search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    pub m: u32,
    pub ef_construction: u32,
    pub ef: u32,
    pub metric_type: MetricType,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construction: 200,
            ef: 200,
            metric_type: MetricType::L2,
        }
    }
}

impl HnswConfig {
    pub const INDEX_TYPE: IndexType = IndexType::Hnsw;

    /// Metric name sent to the server. COSINE runs as L2 over normalized data.
    pub fn parse_metric(&self) -> &'static str {
        match self.metric_type {
            MetricType::Cosine => MetricType::L2.as_str(),
            other => other.as_str(),
        }
    }

    pub fn index_param(&self) -> Value {
        json!({
            "metric_type": self.parse_metric(),
            "index_type": Self::INDEX_TYPE.as_str(),
            "params": { "M": self.m, "efConstruction": self.ef_construction },
        })
    }

    pub fn search_param(&self) -> Value {
        json!({
            "metric_type": self.parse_metric(),
            "params": { "ef": self.ef },
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────────

pub struct Mochow {
    name: String,
    dim: usize,
    hnsw: HnswConfig,
    db_name: String,
    table_name: String,
    client: MochowClient,
}

impl Mochow {
    pub fn new(
        dim: usize,
        config: MochowConfig,
        hnsw: HnswConfig,
        db_name: &str,
        table_name: &str,
    ) -> Self {
        let name = if config.db_label.is_empty() {
            "Mochow".to_string()
        } else {
            format!("Mochow-{}", config.db_label)
        };
        Self {
            name,
            dim,
            hnsw,
            db_name: db_name.to_string(),
            table_name: table_name.to_string(),
            client: MochowClient::new(config.client_config()),
        }
    }

    fn create_table_request(&self) -> CreateTableRequest {
        let params = self.hnsw.index_param()["params"].clone();
        CreateTableRequest {
            database: self.db_name.clone(),
            table: self.table_name.clone(),
            replication: 1,
            partition: Partition::hash(1),
            schema: TableSchema {
                fields: vec![
                    FieldSchema::auto_id(PRIMARY_FIELD),
                    FieldSchema::float_vector(VECTOR_FIELD, self.dim),
                ],
                indexes: vec![IndexSchema {
                    index_name: INDEX_NAME.to_string(),
                    field: VECTOR_FIELD.to_string(),
                    index_type: HnswConfig::INDEX_TYPE.as_str().to_string(),
                    metric_type: self.hnsw.parse_metric().to_string(),
                    params,
                    auto_build: false,
                }],
            },
        }
    }

    fn table_exists(&mut self) -> BenchResult<bool> {
        let tables = self.client.list_tables(&self.db_name)?;
        Ok(tables.iter().any(|t| *t == self.table_name))
    }

    /// Rebuild the vector index and block until it serves queries.
    fn post_insert(&mut self) -> BenchResult<()> {
        tracing::info!(db = %self.name, index = INDEX_NAME, "rebuilding vector index");
        let start = Instant::now();
        self.client
            .rebuild_vector_index(&self.db_name, &self.table_name, INDEX_NAME)?;
        loop {
            let index = self
                .client
                .describe_index(&self.db_name, &self.table_name, INDEX_NAME)?;
            tracing::debug!(state = %index.state, "index state");
            if index.is_ready() {
                break;
            }
            std::thread::sleep(INDEX_POLL_INTERVAL);
        }
        tracing::info!(
            db = %self.name,
            elapsed_s = start.elapsed().as_secs_f64(),
            "vector index ready"
        );
        Ok(())
    }
}

impl VectorDb for Mochow {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> BenchResult<()> {
        let databases = self.client.list_databases()?;
        if !databases.iter().any(|d| *d == self.db_name) {
            self.client.create_database(&self.db_name)?;
            tracing::info!(database = %self.db_name, "created database");
        }
        if !self.table_exists()? {
            let request = self.create_table_request();
            self.client.create_table(&request)?;
            tracing::info!(table = %self.table_name, dim = self.dim, "created table");
        }
        Ok(())
    }

    fn drop_old(&mut self) -> BenchResult<()> {
        let databases = self.client.list_databases()?;
        if !databases.iter().any(|d| *d == self.db_name) || !self.table_exists()? {
            return Ok(());
        }
        self.client.drop_table(&self.db_name, &self.table_name)?;
        tracing::info!(table = %self.table_name, "dropping old table");
        // Table drop is asynchronous on the server.
        for _ in 0..DROP_POLL_ATTEMPTS {
            if !self.table_exists()? {
                return Ok(());
            }
            std::thread::sleep(DROP_POLL_INTERVAL);
        }
        Err(BenchError::Workload(format!(
            "table {} still present after drop",
            self.table_name
        )))
    }

    fn connect(&mut self) -> BenchResult<()> {
        self.client.connect();
        Ok(())
    }

    fn disconnect(&mut self) -> BenchResult<()> {
        self.client.disconnect();
        Ok(())
    }

    fn insert_embeddings(
        &mut self,
        embeddings: &[Vec<f32>],
        ids: &[i64],
        last_batch: bool,
    ) -> BenchResult<usize> {
        let rows: Vec<Value> = embeddings
            .iter()
            .map(|v| json!({ VECTOR_FIELD: v }))
            .collect();
        let affected = self
            .client
            .upsert_rows(&self.db_name, &self.table_name, &rows)?;
        tracing::trace!(rows = rows.len(), affected, "upserted batch");
        if last_batch {
            self.post_insert()?;
        }
        Ok(ids.len())
    }

    fn search_embedding(
        &mut self,
        query: &[f32],
        k: usize,
        filters: Option<&Filters>,
    ) -> BenchResult<Vec<i64>> {
        let anns = AnnSearch {
            vector_field: VECTOR_FIELD.to_string(),
            vector_floats: query.to_vec(),
            params: AnnParams {
                ef: self.hnsw.ef,
                limit: k,
            },
            filter: filters.and_then(filter_expression),
        };
        let rows = self
            .client
            .search_rows(&self.db_name, &self.table_name, &anns)?;
        rows.iter()
            .map(|row| {
                row.primary_key(PRIMARY_FIELD)
                    // Auto-increment keys start at 1, dataset ids at 0.
                    .map(|id| id as i64 - 1)
                    .ok_or_else(|| BenchError::Workload("search hit without primary key".into()))
            })
            .collect()
    }

    /// COSINE is served as L2, which only ranks correctly on unit vectors.
    fn need_normalize_cosine(&self) -> bool {
        true
    }
}

/// Render `{field: value, ..}` as an AND of equality predicates.
fn filter_expression(filters: &Filters) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let clauses: Vec<String> = filters
        .iter()
        .map(|(field, value)| match value {
            Value::String(s) => format!("{field} == \"{}\"", escape_string(s)),
            other => format!("{field} == {other}"),
        })
        .collect();
    Some(clauses.join(" AND "))
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_ignores_db_label() {
        let mut config = MochowConfig {
            api_key: "k".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        config.host.clear();
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn cosine_is_sent_as_l2() {
        let hnsw = HnswConfig {
            metric_type: MetricType::Cosine,
            ..Default::default()
        };
        assert_eq!(hnsw.parse_metric(), "L2");
        assert_eq!(hnsw.index_param()["params"]["M"], 32);
        assert_eq!(hnsw.index_param()["index_type"], "HNSW");
        assert_eq!(hnsw.search_param()["params"]["ef"], 200);
        let ip = HnswConfig {
            metric_type: MetricType::Ip,
            ..Default::default()
        };
        assert_eq!(ip.parse_metric(), "IP");
    }

    #[test]
    fn table_request_matches_schema() {
        let db = Mochow::new(
            768,
            MochowConfig::default(),
            HnswConfig::default(),
            "bench_db",
            "bench_table",
        );
        let req = serde_json::to_value(db.create_table_request()).unwrap();
        assert_eq!(req["replication"], 1);
        assert_eq!(req["partition"]["partitionType"], "HASH");
        assert_eq!(req["partition"]["partitionNum"], 1);
        let fields = req["schema"]["fields"].as_array().unwrap();
        assert_eq!(fields[0]["fieldName"], "id");
        assert_eq!(fields[0]["autoIncrement"], true);
        assert_eq!(fields[1]["dimension"], 768);
        let index = &req["schema"]["indexes"][0];
        assert_eq!(index["indexName"], "vector_idx");
        assert_eq!(index["autoBuild"], false);
        assert_eq!(index["params"]["efConstruction"], 200);
    }

    #[test]
    fn label_is_part_of_name() {
        let config = MochowConfig {
            db_label: "4c16g".into(),
            ..Default::default()
        };
        let db = Mochow::new(8, config, HnswConfig::default(), "d", "t");
        assert_eq!(db.name(), "Mochow-4c16g");
    }

    #[test]
    fn filters_render_as_conjunction() {
        let mut f = Filters::new();
        assert_eq!(filter_expression(&f), None);
        f.insert("id".into(), json!(10));
        f.insert("tag".into(), json!("a"));
        assert_eq!(filter_expression(&f).unwrap(), "id == 10 AND tag == \"a\"");
    }

    #[test]
    fn filter_strings_are_escaped() {
        let mut f = Filters::new();
        f.insert("tag".into(), json!(r#"say "hi" \ bye"#));
        assert_eq!(
            filter_expression(&f).unwrap(),
            r#"tag == "say \"hi\" \\ bye""#
        );
    }

    #[test]
    fn cosine_data_must_be_normalized() {
        let db = Mochow::new(8, MochowConfig::default(), HnswConfig::default(), "d", "t");
        assert!(db.need_normalize_cosine());
    }
}
