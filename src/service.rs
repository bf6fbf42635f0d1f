// Service facade: the boundary between validated requests and the remote Milvus instance

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

use crate::{
    csv_io::CsvTable,
    distance::{distance_matrix, ResolvedVectors},
    error::{CliError, Result},
    types::FieldDataType,
    validation::{
        CalcRequest, CollectionSpec, IndexSpec, QueryRequest, SearchRequest, VectorOperand,
    },
};

// --- Connection handle ---

/// Address of one Milvus instance, registered under an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub alias: String,
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Connection {
    pub fn new(alias: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            alias: alias.into(),
            host: host.into(),
            port,
            token: None,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Root of the REST API, e.g. `http://127.0.0.1:19530/v2/vectordb/`.
    pub fn base_url(&self) -> Result<Url> {
        let raw = if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}/v2/vectordb/", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}/v2/vectordb/", self.host, self.port)
        };
        Url::parse(&raw)
            .map_err(|e| CliError::Connection(format!("invalid address `{}`: {}", raw, e)))
    }
}

// --- Result shapes ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDetails {
    pub name: String,
    /// Upper-case type label, e.g. `FLOAT_VECTOR`.
    pub data_type: String,
    pub is_primary: bool,
    pub auto_id: bool,
    pub description: String,
    pub dim: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionDetails {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldDetails>,
    pub partitions: Vec<String>,
    pub indexes: Vec<String>,
    pub num_entities: u64,
    pub load_state: String,
}

impl CollectionDetails {
    pub fn primary_field(&self) -> Option<&FieldDetails> {
        self.fields.iter().find(|f| f.is_primary)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDetails> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionDetails {
    pub name: String,
    pub num_entities: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDetails {
    pub collection: String,
    pub field_name: String,
    pub index_name: String,
    pub index_type: String,
    pub metric_type: String,
    pub params: BTreeMap<String, Value>,
    pub state: String,
    pub indexed_rows: u64,
    pub total_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadProgress {
    pub state: String,
    /// Percentage in `0..=100`.
    pub progress: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: Value,
    pub distance: f32,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertSummary {
    pub insert_count: u64,
    pub total_entities: u64,
    /// False when the post-insert flush failed, so `total_entities` may not include the new rows.
    pub flushed: bool,
}

// --- Service contract ---

/// Operations the CLI issues against Milvus. Implementations own their transport; callers only
/// ever pass validated requests.
#[async_trait]
pub trait MilvusService: Send + Sync {
    fn connection(&self) -> &Connection;

    /// Cheap round trip used before issuing data-plane requests.
    async fn check_connection(&self) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn has_collection(&self, collection: &str) -> Result<bool>;

    async fn describe_collection(&self, collection: &str) -> Result<CollectionDetails>;

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    async fn drop_collection(&self, collection: &str, timeout: Option<f64>) -> Result<()>;

    /// Loads the whole collection, or only `partitions` when given.
    async fn load(&self, collection: &str, partitions: Option<&[String]>) -> Result<()>;

    async fn release(&self, collection: &str, partitions: Option<&[String]>) -> Result<()>;

    async fn loading_progress(
        &self,
        collection: &str,
        partitions: Option<&[String]>,
    ) -> Result<LoadProgress>;

    async fn list_partitions(&self, collection: &str) -> Result<Vec<String>>;

    async fn describe_partition(&self, collection: &str, partition: &str)
        -> Result<PartitionDetails>;

    async fn create_partition(
        &self,
        collection: &str,
        partition: &str,
        description: Option<&str>,
    ) -> Result<()>;

    async fn drop_partition(&self, collection: &str, partition: &str, timeout: Option<f64>)
        -> Result<()>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDetails>>;

    /// Details of the named index, or of the collection's first index. `None` when unindexed.
    async fn describe_index(
        &self,
        collection: &str,
        index_name: Option<&str>,
    ) -> Result<Option<IndexDetails>>;

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        spec: &IndexSpec,
        timeout: Option<f64>,
    ) -> Result<()>;

    async fn drop_index(&self, collection: &str, index_name: &str, timeout: Option<f64>)
        -> Result<()>;

    /// One list of hits per query vector.
    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<Vec<SearchHit>>>;

    async fn query(&self, collection: &str, request: &QueryRequest) -> Result<Vec<Map<String, Value>>>;

    async fn insert(
        &self,
        collection: &str,
        partition: Option<&str>,
        table: &CsvTable,
        timeout: Option<f64>,
    ) -> Result<InsertSummary>;

    async fn delete_entities(
        &self,
        collection: &str,
        expr: &str,
        partition: Option<&str>,
        timeout: Option<f64>,
    ) -> Result<u64>;

    async fn create_alias(&self, collection: &str, alias: &str, timeout: Option<f64>) -> Result<()>;

    async fn alter_alias(&self, collection: &str, alias: &str, timeout: Option<f64>) -> Result<()>;

    async fn drop_alias(&self, alias: &str, timeout: Option<f64>) -> Result<()>;

    async fn query_segment_info(&self, collection: &str, _timeout: Option<f64>) -> Result<Vec<Value>> {
        Err(CliError::remote(
            format!("query segment info for {}", collection),
            "not exposed by this endpoint",
        ))
    }

    async fn load_balance(
        &self,
        src_node: i64,
        _dst_nodes: &[i64],
        _sealed_segments: &[i64],
        _timeout: Option<f64>,
    ) -> Result<()> {
        Err(CliError::remote(
            format!("load balance from node {}", src_node),
            "not exposed by this endpoint",
        ))
    }

    /// Fetches the vectors stored under `ids`, in the order given. Missing ids map to `None`.
    async fn fetch_vectors(
        &self,
        collection: &str,
        partition: &str,
        field: &str,
        ids: &[i64],
    ) -> Result<ResolvedVectors> {
        let details = self.describe_collection(collection).await?;
        let primary = details
            .primary_field()
            .ok_or_else(|| CliError::remote("describe collection", "no primary field"))?
            .name
            .clone();
        let is_binary = details
            .field(field)
            .map(|f| f.data_type == FieldDataType::BinaryVector.as_str())
            .ok_or_else(|| {
                CliError::remote("describe collection", format!("no field named `{}`", field))
            })?;

        let id_list: Vec<String> = ids.iter().map(i64::to_string).collect();
        let request = QueryRequest {
            expr: format!("{} in [{}]", primary, id_list.join(", ")),
            output_fields: Some(vec![primary.clone(), field.to_string()]),
            partition_names: Some(vec![partition.to_string()]),
            timeout: None,
            guarantee_timestamp: None,
            graceful_time: None,
            travel_timestamp: None,
        };
        let rows = self.query(collection, &request).await?;
        debug!("Fetched {} of {} requested vectors", rows.len(), ids.len());

        let by_id: BTreeMap<i64, &Value> = rows
            .iter()
            .filter_map(|row| Some((row.get(&primary)?.as_i64()?, row.get(field)?)))
            .collect();
        Ok(if is_binary {
            ResolvedVectors::Binary(
                ids.iter()
                    .map(|id| by_id.get(id).and_then(|v| binary_from_value(v)))
                    .collect(),
            )
        } else {
            ResolvedVectors::Float(
                ids.iter()
                    .map(|id| by_id.get(id).and_then(|v| serde_json::from_value((*v).clone()).ok()))
                    .collect(),
            )
        })
    }

    /// Distance matrix between the two operands. Imported operands are fetched first.
    async fn calc_distance(&self, request: &CalcRequest) -> Result<Vec<Vec<f32>>> {
        let left = self.resolve_operand(&request.vectors_left).await?;
        let right = self.resolve_operand(&request.vectors_right).await?;
        info!(
            "Calculating {} x {} distances with {}",
            left.len(),
            right.len(),
            request.params.metric_type
        );
        Ok(distance_matrix(&left, &right, &request.params)?)
    }

    async fn resolve_operand(&self, operand: &VectorOperand) -> Result<ResolvedVectors> {
        match operand {
            VectorOperand::Imported {
                ids,
                collection,
                partition,
                field,
            } => self.fetch_vectors(collection, partition, field, ids).await,
            VectorOperand::FloatVectors(v) => {
                Ok(ResolvedVectors::Float(v.iter().cloned().map(Some).collect()))
            }
            VectorOperand::BinVectors(v) => {
                Ok(ResolvedVectors::Binary(v.iter().cloned().map(Some).collect()))
            }
        }
    }
}

/// Binary vectors come back either as a byte array or as a string of raw bytes.
fn binary_from_value(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        Value::String(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

/// Opens a REST-backed service for `connection` and verifies it answers.
pub async fn connect(connection: Connection, request_timeout: Duration) -> Result<Arc<dyn MilvusService>> {
    let service = crate::service_rest::RestService::new(connection, request_timeout)?;
    service.check_connection().await?;
    info!(
        "Connected to Milvus at {}:{} as '{}'",
        service.connection().host,
        service.connection().port,
        service.connection().alias
    );
    Ok(Arc::new(service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_from_host_and_port() {
        let conn = Connection::new("default", "127.0.0.1", 19530);
        assert_eq!(
            conn.base_url().unwrap().as_str(),
            "http://127.0.0.1:19530/v2/vectordb/"
        );

        let conn = Connection::new("tls", "https://milvus.example.com/", 443);
        assert_eq!(
            conn.base_url().unwrap().as_str(),
            "https://milvus.example.com/v2/vectordb/"
        );
    }

    #[test]
    fn empty_token_is_dropped() {
        let conn = Connection::new("a", "h", 1).with_token(Some(String::new()));
        assert_eq!(conn.token, None);
    }

    #[test]
    fn binary_values() {
        assert_eq!(binary_from_value(&json!([1, 255])), Some(vec![1, 255]));
        assert_eq!(binary_from_value(&json!([256])), None);
        assert_eq!(binary_from_value(&json!("N")), Some(vec![b'N']));
        assert_eq!(binary_from_value(&json!(1)), None);
    }
}
