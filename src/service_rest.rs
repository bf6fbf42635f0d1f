// MilvusService over the Milvus RESTful v2 API

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, warn};
use url::Url;

use crate::{
    csv_io::CsvTable,
    error::{CliError, Result},
    service::{
        CollectionDetails, Connection, FieldDetails, IndexDetails, InsertSummary, LoadProgress,
        MilvusService, PartitionDetails, SearchHit,
    },
    types::{data_type_label, FieldDataType},
    validation::{CollectionSpec, IndexSpec, QueryRequest, SearchRequest},
};

/// Length given to STRING fields, which the server stores as VarChar.
pub const VARCHAR_MAX_LENGTH: u32 = 65_535;

const CONNECTION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

pub struct RestService {
    client: Client,
    base: Url,
    connection: Connection,
}

impl RestService {
    pub fn new(connection: Connection, request_timeout: Duration) -> Result<Self> {
        let base = connection.base_url()?;
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CliError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            base,
            connection,
        })
    }

    /// POSTs `body` to `path` and returns the `data` member of a successful envelope.
    async fn post(
        &self,
        operation: &str,
        path: &str,
        body: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let url = self
            .base
            .join(path)
            .map_err(|e| CliError::Connection(format!("invalid endpoint `{}`: {}", path, e)))?;
        debug!("POST {} ({})", url, operation);

        let mut request = self.client.post(url.clone()).json(&body);
        if let Some(token) = &self.connection.token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            CliError::Connection(format!("{}:{}: {}", self.connection.host, self.connection.port, e))
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CliError::Connection(e.to_string()))?;

        let envelope: Envelope = serde_json::from_str(&text).map_err(|_| {
            CliError::remote(operation, format!("HTTP {}: {}", status, text.trim()))
        })?;
        if envelope.code != 0 || !status.is_success() {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("HTTP {} (code {})", status, envelope.code));
            warn!("{} failed: {}", operation, message);
            return Err(CliError::remote(operation, message));
        }
        Ok(envelope.data)
    }

    async fn row_count(&self, operation: &str, path: &str, body: Value) -> Result<u64> {
        let data = self.post(operation, path, body, None).await?;
        Ok(as_u64(data.get("rowCount")))
    }
}

fn seconds(timeout: Option<f64>) -> Option<Duration> {
    timeout
        .filter(|t| *t > 0.0)
        .and_then(|t| Duration::try_from_secs_f64(t).ok())
}

/// Counts arrive as numbers or numeric strings depending on the server version.
fn as_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn as_str(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// --- Request bodies ---

pub fn rest_type_name(data_type: FieldDataType) -> &'static str {
    match data_type {
        FieldDataType::Bool => "Bool",
        FieldDataType::Int8 => "Int8",
        FieldDataType::Int16 => "Int16",
        FieldDataType::Int32 => "Int32",
        FieldDataType::Int64 => "Int64",
        FieldDataType::Float => "Float",
        FieldDataType::Double => "Double",
        FieldDataType::String => "VarChar",
        FieldDataType::BinaryVector => "BinaryVector",
        FieldDataType::FloatVector => "FloatVector",
    }
}

/// Maps a server type name back to the CLI's upper-case label.
pub fn type_label_from_rest(name: &str) -> String {
    FieldDataType::ALL
        .into_iter()
        .find(|t| rest_type_name(*t).eq_ignore_ascii_case(name))
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| name.to_uppercase())
}

pub fn create_collection_body(spec: &CollectionSpec) -> Value {
    let fields: Vec<Value> = spec
        .fields
        .iter()
        .map(|field| {
            let is_primary = field.name == spec.primary_field;
            let mut entry = json!({
                "fieldName": field.name,
                "dataType": rest_type_name(field.data_type),
                "isPrimary": is_primary,
            });
            let mut params = Map::new();
            if let Some(dim) = field.dim() {
                params.insert("dim".into(), json!(dim));
            }
            if field.data_type == FieldDataType::String {
                params.insert("max_length".into(), json!(VARCHAR_MAX_LENGTH));
            }
            if !params.is_empty() {
                entry["elementTypeParams"] = Value::Object(params);
            }
            if !field.description().is_empty() {
                entry["description"] = json!(field.description());
            }
            entry
        })
        .collect();
    json!({
        "collectionName": spec.name,
        "description": spec.description,
        "schema": {
            "autoId": spec.auto_id,
            "enableDynamicField": false,
            "fields": fields,
        },
    })
}

pub fn create_index_body(collection: &str, field: &str, spec: &IndexSpec) -> Value {
    let mut params = Map::new();
    params.insert("index_type".into(), json!(spec.index_type.as_str()));
    for (name, value) in &spec.params {
        params.insert(name.clone(), json!(value));
    }
    json!({
        "collectionName": collection,
        "indexParams": [{
            "fieldName": field,
            "indexName": field,
            "metricType": spec.metric_type.as_str(),
            "params": params,
        }],
    })
}

pub fn search_body(collection: &str, request: &SearchRequest) -> Value {
    let mut body = json!({
        "collectionName": collection,
        "data": request.data,
        "annsField": request.anns_field,
        "limit": request.limit,
    });
    let mut search_params = Map::new();
    if let Some(metric) = request.param.metric_type {
        search_params.insert("metricType".into(), json!(metric.as_str()));
    }
    if !request.param.params.is_empty() {
        search_params.insert("params".into(), json!(request.param.params));
    }
    if !search_params.is_empty() {
        body["searchParams"] = Value::Object(search_params);
    }
    if let Some(expr) = &request.expr {
        body["filter"] = json!(expr);
    }
    if let Some(partitions) = &request.partition_names {
        body["partitionNames"] = json!(partitions);
    }
    if let Some(round_decimal) = request.round_decimal {
        body["roundDecimal"] = json!(round_decimal);
    }
    if let Some(ts) = request.guarantee_timestamp {
        body["guaranteeTimestamp"] = json!(ts);
    }
    if let Some(ts) = request.travel_timestamp {
        body["travelTimestamp"] = json!(ts);
    }
    body
}

pub fn query_body(collection: &str, request: &QueryRequest) -> Value {
    let mut body = json!({
        "collectionName": collection,
        "filter": request.expr,
    });
    if let Some(fields) = &request.output_fields {
        body["outputFields"] = json!(fields);
    }
    if let Some(partitions) = &request.partition_names {
        body["partitionNames"] = json!(partitions);
    }
    if let Some(ts) = request.guarantee_timestamp {
        body["guaranteeTimestamp"] = json!(ts);
    }
    if let Some(graceful) = request.graceful_time {
        body["gracefulTime"] = json!(graceful);
    }
    if let Some(ts) = request.travel_timestamp {
        body["travelTimestamp"] = json!(ts);
    }
    body
}

/// Turns the column-major CSV table into row objects keyed by column name.
pub fn insert_rows(table: &CsvTable) -> Vec<Value> {
    table
        .rows()
        .into_iter()
        .map(|row| {
            let object: Map<String, Value> = table.columns.iter().cloned().zip(row).collect();
            Value::Object(object)
        })
        .collect()
}

fn partition_body(collection: &str, partitions: Option<&[String]>) -> Value {
    let mut body = json!({ "collectionName": collection });
    if let Some(partitions) = partitions.filter(|p| !p.is_empty()) {
        body["partitionNames"] = json!(partitions);
    }
    body
}

// --- Response parsing ---

fn parse_field(value: &Value) -> FieldDetails {
    let dim = value
        .get("params")
        .and_then(Value::as_array)
        .and_then(|params| {
            params
                .iter()
                .find(|p| p.get("key").and_then(Value::as_str) == Some("dim"))
        })
        .map(|p| as_u64(p.get("value")))
        .or_else(|| value.get("elementTypeParams").map(|p| as_u64(p.get("dim"))));
    FieldDetails {
        name: as_str(value.get("name")),
        data_type: match value.get("type") {
            Some(Value::Number(code)) => {
                data_type_label(code.as_u64().and_then(|c| u32::try_from(c).ok()).unwrap_or(999))
                    .to_string()
            }
            other => type_label_from_rest(&as_str(other)),
        },
        is_primary: value.get("primaryKey").and_then(Value::as_bool).unwrap_or(false),
        auto_id: value.get("autoId").and_then(Value::as_bool).unwrap_or(false),
        description: as_str(value.get("description")),
        dim,
    }
}

pub fn parse_collection(data: &Value, partitions: Vec<String>, num_entities: u64) -> CollectionDetails {
    let fields = data
        .get("fields")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().map(parse_field).collect())
        .unwrap_or_default();
    let indexes = data
        .get("indexes")
        .and_then(Value::as_array)
        .map(|idx| idx.iter().map(|i| as_str(i.get("indexName"))).collect())
        .unwrap_or_default();
    CollectionDetails {
        name: as_str(data.get("collectionName")),
        description: as_str(data.get("description")),
        fields,
        partitions,
        indexes,
        num_entities,
        load_state: as_str(data.get("load")),
    }
}

pub fn parse_index(collection: &str, value: &Value) -> IndexDetails {
    let params = value
        .get("params")
        .and_then(Value::as_object)
        .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_else(BTreeMap::new);
    IndexDetails {
        collection: collection.to_string(),
        field_name: as_str(value.get("fieldName")),
        index_name: as_str(value.get("indexName")),
        index_type: as_str(value.get("indexType")),
        metric_type: as_str(value.get("metricType")),
        params,
        state: as_str(value.get("indexState")),
        indexed_rows: as_u64(value.get("indexedRows")),
        total_rows: as_u64(value.get("totalRows")),
    }
}

fn parse_hit(value: &Value) -> SearchHit {
    let mut fields = value.as_object().cloned().unwrap_or_default();
    let id = fields.remove("id").unwrap_or(Value::Null);
    let distance = fields
        .remove("distance")
        .and_then(|d| d.as_f64())
        .unwrap_or_default() as f32;
    SearchHit { id, distance, fields }
}

/// Groups search hits per query vector. Flat answers for several queries are split by `limit`.
pub fn parse_search_hits(data: &Value, num_queries: usize, limit: u64) -> Vec<Vec<SearchHit>> {
    let Some(items) = data.as_array() else {
        return Vec::new();
    };
    if items.iter().all(Value::is_array) && !items.is_empty() {
        return items
            .iter()
            .map(|group| group.as_array().map(|g| g.iter().map(parse_hit).collect()).unwrap_or_default())
            .collect();
    }
    let hits: Vec<SearchHit> = items.iter().map(parse_hit).collect();
    if num_queries <= 1 {
        return vec![hits];
    }
    hits.chunks(limit.max(1) as usize).map(<[SearchHit]>::to_vec).collect()
}

#[async_trait]
impl MilvusService for RestService {
    fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn check_connection(&self) -> Result<()> {
        self.post(
            "list collections",
            "collections/list",
            json!({}),
            Some(CONNECTION_CHECK_TIMEOUT),
        )
        .await
        .map(|_| ())
        .map_err(|e| match e {
            CliError::RemoteOperation { message, .. } => CliError::Connection(message),
            other => other,
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let data = self
            .post("list collections", "collections/list", json!({}), None)
            .await?;
        Ok(string_list(&data))
    }

    async fn has_collection(&self, collection: &str) -> Result<bool> {
        let data = self
            .post(
                "has collection",
                "collections/has",
                json!({ "collectionName": collection }),
                None,
            )
            .await?;
        Ok(data.get("has").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn describe_collection(&self, collection: &str) -> Result<CollectionDetails> {
        let body = json!({ "collectionName": collection });
        let data = self
            .post("describe collection", "collections/describe", body.clone(), None)
            .await?;
        let partitions = self.list_partitions(collection).await?;
        let num_entities = self
            .row_count("collection stats", "collections/get_stats", body)
            .await?;
        Ok(parse_collection(&data, partitions, num_entities))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        self.post(
            "create collection",
            "collections/create",
            create_collection_body(spec),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn drop_collection(&self, collection: &str, timeout: Option<f64>) -> Result<()> {
        self.post(
            "drop collection",
            "collections/drop",
            json!({ "collectionName": collection }),
            seconds(timeout),
        )
        .await
        .map(|_| ())
    }

    async fn load(&self, collection: &str, partitions: Option<&[String]>) -> Result<()> {
        let (operation, path) = match partitions {
            Some(p) if !p.is_empty() => ("load partitions", "partitions/load"),
            _ => ("load collection", "collections/load"),
        };
        self.post(operation, path, partition_body(collection, partitions), None)
            .await
            .map(|_| ())
    }

    async fn release(&self, collection: &str, partitions: Option<&[String]>) -> Result<()> {
        let (operation, path) = match partitions {
            Some(p) if !p.is_empty() => ("release partitions", "partitions/release"),
            _ => ("release collection", "collections/release"),
        };
        self.post(operation, path, partition_body(collection, partitions), None)
            .await
            .map(|_| ())
    }

    async fn loading_progress(
        &self,
        collection: &str,
        partitions: Option<&[String]>,
    ) -> Result<LoadProgress> {
        let data = self
            .post(
                "get load state",
                "collections/get_load_state",
                partition_body(collection, partitions),
                None,
            )
            .await?;
        let state = as_str(data.get("loadState"));
        let progress = match data.get("loadProgress") {
            Some(p) => as_u64(Some(p)),
            None if state == "LoadStateLoaded" => 100,
            None => 0,
        };
        Ok(LoadProgress { state, progress })
    }

    async fn list_partitions(&self, collection: &str) -> Result<Vec<String>> {
        let data = self
            .post(
                "list partitions",
                "partitions/list",
                json!({ "collectionName": collection }),
                None,
            )
            .await?;
        Ok(string_list(&data))
    }

    async fn describe_partition(
        &self,
        collection: &str,
        partition: &str,
    ) -> Result<PartitionDetails> {
        let body = json!({ "collectionName": collection, "partitionName": partition });
        let data = self.post("has partition", "partitions/has", body.clone(), None).await?;
        if !data.get("has").and_then(Value::as_bool).unwrap_or(false) {
            return Err(CliError::remote(
                "describe partition",
                format!("partition `{}` not found in `{}`", partition, collection),
            ));
        }
        let num_entities = self
            .row_count("partition stats", "partitions/get_stats", body)
            .await?;
        Ok(PartitionDetails {
            name: partition.to_string(),
            num_entities,
        })
    }

    async fn create_partition(
        &self,
        collection: &str,
        partition: &str,
        description: Option<&str>,
    ) -> Result<()> {
        if description.is_some_and(|d| !d.is_empty()) {
            debug!("Partition descriptions are not stored by this endpoint");
        }
        self.post(
            "create partition",
            "partitions/create",
            json!({ "collectionName": collection, "partitionName": partition }),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn drop_partition(
        &self,
        collection: &str,
        partition: &str,
        timeout: Option<f64>,
    ) -> Result<()> {
        self.post(
            "drop partition",
            "partitions/drop",
            json!({ "collectionName": collection, "partitionName": partition }),
            seconds(timeout),
        )
        .await
        .map(|_| ())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDetails>> {
        let data = self
            .post(
                "list indexes",
                "indexes/list",
                json!({ "collectionName": collection }),
                None,
            )
            .await?;
        let mut indexes = Vec::new();
        for name in string_list(&data) {
            if let Some(index) = self.describe_index(collection, Some(&name)).await? {
                indexes.push(index);
            }
        }
        Ok(indexes)
    }

    async fn describe_index(
        &self,
        collection: &str,
        index_name: Option<&str>,
    ) -> Result<Option<IndexDetails>> {
        let index_name = match index_name {
            Some(name) => name.to_string(),
            None => {
                let data = self
                    .post(
                        "list indexes",
                        "indexes/list",
                        json!({ "collectionName": collection }),
                        None,
                    )
                    .await?;
                match string_list(&data).into_iter().next() {
                    Some(name) => name,
                    None => return Ok(None),
                }
            }
        };
        let data = self
            .post(
                "describe index",
                "indexes/describe",
                json!({ "collectionName": collection, "indexName": index_name }),
                None,
            )
            .await?;
        let first = match &data {
            Value::Array(items) => items.first(),
            Value::Object(_) => Some(&data),
            _ => None,
        };
        Ok(first.map(|v| parse_index(collection, v)))
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        spec: &IndexSpec,
        timeout: Option<f64>,
    ) -> Result<()> {
        self.post(
            "create index",
            "indexes/create",
            create_index_body(collection, field, spec),
            seconds(timeout),
        )
        .await
        .map(|_| ())
    }

    async fn drop_index(&self, collection: &str, index_name: &str, timeout: Option<f64>) -> Result<()> {
        self.post(
            "drop index",
            "indexes/drop",
            json!({ "collectionName": collection, "indexName": index_name }),
            seconds(timeout),
        )
        .await
        .map(|_| ())
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<Vec<SearchHit>>> {
        let data = self
            .post(
                "search",
                "entities/search",
                search_body(collection, request),
                seconds(request.timeout),
            )
            .await?;
        Ok(parse_search_hits(&data, request.data.len(), request.limit))
    }

    async fn query(&self, collection: &str, request: &QueryRequest) -> Result<Vec<Map<String, Value>>> {
        let data = self
            .post(
                "query",
                "entities/query",
                query_body(collection, request),
                seconds(request.timeout),
            )
            .await?;
        Ok(data
            .as_array()
            .map(|rows| rows.iter().filter_map(|r| r.as_object().cloned()).collect())
            .unwrap_or_default())
    }

    async fn insert(
        &self,
        collection: &str,
        partition: Option<&str>,
        table: &CsvTable,
        timeout: Option<f64>,
    ) -> Result<InsertSummary> {
        let mut body = json!({
            "collectionName": collection,
            "data": insert_rows(table),
        });
        if let Some(partition) = partition.filter(|p| !p.is_empty()) {
            body["partitionName"] = json!(partition);
        }
        let data = self
            .post("insert", "entities/insert", body, seconds(timeout))
            .await?;
        let insert_count = as_u64(data.get("insertCount"));

        // Flush so the entity count includes the new rows.
        let flushed = match self
            .post(
                "flush",
                "collections/flush",
                json!({ "collectionName": collection }),
                None,
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Flush of '{}' after insert failed: {}", collection, e);
                false
            }
        };
        let total_entities = self
            .row_count(
                "collection stats",
                "collections/get_stats",
                json!({ "collectionName": collection }),
            )
            .await?;
        Ok(InsertSummary {
            insert_count,
            total_entities,
            flushed,
        })
    }

    async fn delete_entities(
        &self,
        collection: &str,
        expr: &str,
        partition: Option<&str>,
        timeout: Option<f64>,
    ) -> Result<u64> {
        let mut body = json!({ "collectionName": collection, "filter": expr });
        if let Some(partition) = partition.filter(|p| !p.is_empty()) {
            body["partitionName"] = json!(partition);
        }
        let data = self
            .post("delete entities", "entities/delete", body, seconds(timeout))
            .await?;
        Ok(as_u64(data.get("deleteCount")))
    }

    async fn create_alias(&self, collection: &str, alias: &str, timeout: Option<f64>) -> Result<()> {
        self.post(
            "create alias",
            "aliases/create",
            json!({ "collectionName": collection, "aliasName": alias }),
            seconds(timeout),
        )
        .await
        .map(|_| ())
    }

    async fn alter_alias(&self, collection: &str, alias: &str, timeout: Option<f64>) -> Result<()> {
        self.post(
            "alter alias",
            "aliases/alter",
            json!({ "collectionName": collection, "aliasName": alias }),
            seconds(timeout),
        )
        .await
        .map(|_| ())
    }

    async fn drop_alias(&self, alias: &str, timeout: Option<f64>) -> Result<()> {
        self.post(
            "drop alias",
            "aliases/drop",
            json!({ "aliasName": alias }),
            seconds(timeout),
        )
        .await
        .map(|_| ())
    }
}
