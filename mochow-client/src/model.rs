//! Request and response bodies of the Mochow REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ────────────────────────────────────────────────────────────────────────────────
// Schema
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub field_name: String,
    pub field_type: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partition_key: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_increment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

impl FieldSchema {
    /// Auto-incrementing `UINT64` primary key that also partitions the table.
    pub fn auto_id(name: &str) -> Self {
        Self {
            field_name: name.to_string(),
            field_type: "UINT64".to_string(),
            primary_key: true,
            partition_key: true,
            auto_increment: true,
            dimension: None,
        }
    }

    pub fn float_vector(name: &str, dimension: usize) -> Self {
        Self {
            field_name: name.to_string(),
            field_type: "FLOAT_VECTOR".to_string(),
            primary_key: false,
            partition_key: false,
            auto_increment: false,
            dimension: Some(dimension),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    pub index_name: String,
    pub field: String,
    pub index_type: String,
    pub metric_type: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub auto_build: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub partition_type: String,
    pub partition_num: u32,
}

impl Partition {
    pub fn hash(partition_num: u32) -> Self {
        Self {
            partition_type: "HASH".to_string(),
            partition_num,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableRequest {
    pub database: String,
    pub table: String,
    pub replication: u32,
    pub partition: Partition,
    pub schema: TableSchema,
}

// ────────────────────────────────────────────────────────────────────────────────
// Search
// ────────────────────────────────────────────────────────────────────────────────

/// Approximate nearest-neighbour search over one vector field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnSearch {
    pub vector_field: String,
    pub vector_floats: Vec<f32>,
    pub params: AnnParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnParams {
    pub ef: u32,
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub rows: Vec<SearchRow>,
}

/// One hit. Older servers put the primary key at the top level, newer ones
/// nest the stored row under `row`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRow {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub row: Option<Map<String, Value>>,
    #[serde(default)]
    pub distance: Option<f32>,
}

impl SearchRow {
    /// Primary key stored in `field`, wherever the server placed it.
    pub fn primary_key(&self, field: &str) -> Option<u64> {
        if field == "id" {
            if let Some(id) = self.id {
                return Some(id);
            }
        }
        self.row.as_ref()?.get(field)?.as_u64()
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Misc responses
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ListDatabasesResponse {
    #[serde(default)]
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListTablesResponse {
    #[serde(default)]
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    #[serde(default)]
    pub affected_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescription {
    #[serde(default)]
    pub index_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub index_type: String,
}

impl IndexDescription {
    /// The index has finished building and serves queries.
    pub fn is_ready(&self) -> bool {
        self.state == "NORMAL"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescIndexResponse {
    pub index: IndexDescription,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescTableResponse {
    pub table: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_schema_omits_false_flags() {
        let v = serde_json::to_value(FieldSchema::float_vector("vector", 768)).unwrap();
        assert_eq!(
            v,
            json!({"fieldName": "vector", "fieldType": "FLOAT_VECTOR", "dimension": 768})
        );
    }

    #[test]
    fn search_row_reads_top_level_or_nested_id() {
        let top: SearchRow = serde_json::from_value(json!({"id": 7, "distance": 0.5})).unwrap();
        assert_eq!(top.primary_key("id"), Some(7));

        let nested: SearchRow =
            serde_json::from_value(json!({"row": {"id": 9}, "distance": 0.1})).unwrap();
        assert_eq!(nested.primary_key("id"), Some(9));
        assert_eq!(nested.primary_key("missing"), None);
    }

    #[test]
    fn index_ready_only_in_normal_state() {
        let building: DescIndexResponse =
            serde_json::from_value(json!({"index": {"indexName": "vector_idx", "state": "BUILDING"}}))
                .unwrap();
        assert!(!building.index.is_ready());
        let normal: DescIndexResponse =
            serde_json::from_value(json!({"index": {"indexName": "vector_idx", "state": "NORMAL"}}))
                .unwrap();
        assert!(normal.index.is_ready());
    }
}
