// Parameter validators: raw user strings in, normalized request structs out

use serde::Serialize;
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
    str::FromStr,
    time::Duration,
};
use tracing::debug;

use crate::{
    csv_io::{self, Progress},
    error::{CliError, ParameterError},
    types::{
        all_search_param_names, build_params_for, search_params_for, vocabulary, FieldDataType,
        IndexType, MetricType, DEFAULT_GRACEFUL_TIME, OPERATORS,
    },
};

// --- Collections ---

/// One field of a collection schema, as written `name:TYPE:extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub data_type: FieldDataType,
    /// Dimension for vector types, free-text description otherwise.
    pub extra: String,
}

impl FieldSpec {
    pub fn dim(&self) -> Option<u32> {
        if self.data_type.is_vector() {
            self.extra.parse().ok()
        } else {
            None
        }
    }

    pub fn description(&self) -> &str {
        if self.data_type.is_vector() {
            ""
        } else {
            &self.extra
        }
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.data_type, self.extra)
    }
}

impl FromStr for FieldSpec {
    type Err = ParameterError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split(':').collect();
        let [name, data_type, extra] = parts.as_slice() else {
            return Err(ParameterError::MalformedFieldSpec(raw.to_string()));
        };
        if name.is_empty() {
            return Err(ParameterError::MalformedFieldSpec(raw.to_string()));
        }
        let data_type: FieldDataType = data_type.parse()?;
        if data_type.is_vector() && !matches!(extra.parse::<u32>(), Ok(dim) if dim > 0) {
            return Err(ParameterError::InvalidVectorDim(extra.to_string()));
        }
        Ok(FieldSpec {
            name: name.to_string(),
            data_type,
            extra: extra.to_string(),
        })
    }
}

/// Validated schema for `create collection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSpec {
    pub name: String,
    pub primary_field: String,
    pub auto_id: bool,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

impl CollectionSpec {
    pub fn with_auto_id(mut self, auto_id: bool) -> Self {
        self.auto_id = auto_id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn primary(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == self.primary_field)
    }
}

pub fn validate_collection_parameter(
    collection_name: &str,
    primary_field: &str,
    fields: &[String],
) -> Result<CollectionSpec, ParameterError> {
    if collection_name.is_empty() {
        return Err(ParameterError::MissingCollectionName);
    }
    if primary_field.is_empty() {
        return Err(ParameterError::MissingPrimaryField);
    }
    if fields.is_empty() {
        return Err(ParameterError::MissingFields);
    }
    let fields = fields
        .iter()
        .map(|raw| raw.parse::<FieldSpec>())
        .collect::<Result<Vec<_>, _>>()?;

    let names: HashSet<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    if names.len() != fields.len() {
        return Err(ParameterError::DuplicateFieldNames);
    }
    if !names.contains(primary_field) {
        return Err(ParameterError::PrimaryFieldNotFound(primary_field.to_string()));
    }

    Ok(CollectionSpec {
        name: collection_name.to_string(),
        primary_field: primary_field.to_string(),
        auto_id: false,
        description: String::new(),
        fields,
    })
}

// --- Indexes ---

/// Validated request for `create index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub index_type: IndexType,
    pub metric_type: MetricType,
    pub params: BTreeMap<String, i64>,
}

/// Splits `name:value` into exactly two parts.
fn split_pair(raw: &str) -> Option<(&str, &str)> {
    let mut parts = raw.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(value), None) => Some((name, value)),
        _ => None,
    }
}

fn parse_int_param(name: &str, value: &str) -> Result<i64, ParameterError> {
    value
        .trim()
        .parse()
        .map_err(|_| ParameterError::NonIntegerParamValue {
            name: name.to_string(),
            value: value.to_string(),
        })
}

pub fn validate_index_parameter(
    index_type: &str,
    metric_type: &str,
    params: &[String],
) -> Result<IndexSpec, ParameterError> {
    let index_type: IndexType = index_type.parse()?;
    let metric_type: MetricType = metric_type.parse()?;
    let allowed = build_params_for(index_type);

    let mut parsed = BTreeMap::new();
    for raw in params {
        let (name, value) =
            split_pair(raw).ok_or_else(|| ParameterError::MalformedIndexParam(raw.clone()))?;
        if !allowed.contains(name) {
            return Err(ParameterError::UnknownIndexParam {
                got: name.to_string(),
                expected: vocabulary(allowed.iter().copied()),
            });
        }
        parsed.insert(name.to_string(), parse_int_param(name, value)?);
    }
    if parsed.len() != params.len() {
        return Err(ParameterError::DuplicateIndexParams);
    }

    Ok(IndexSpec {
        index_type,
        metric_type,
        params: parsed,
    })
}

// --- Shared helpers ---

/// Treats missing and blank inputs alike.
fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Splits a comma separated list, dropping whitespace and empty entries.
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|name| name.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|name| !name.is_empty())
        .collect()
}

fn optional_names(raw: Option<&str>) -> Option<Vec<String>> {
    present(raw).map(split_names).filter(|names| !names.is_empty())
}

/// Parses an optional timeout in seconds. It must be non-negative and fit in a `Duration`.
pub fn optional_timeout(raw: Option<&str>) -> Result<Option<f64>, ParameterError> {
    present(raw)
        .map(|s| {
            s.parse::<f64>()
                .ok()
                .filter(|t| *t >= 0.0 && Duration::try_from_secs_f64(*t).is_ok())
                .ok_or_else(|| ParameterError::InvalidTimeout(s.to_string()))
        })
        .transpose()
}

/// Parses an optional timestamp. Zero means "not set", as it does on the server.
fn optional_timestamp(name: &'static str, raw: Option<&str>) -> Result<Option<u64>, ParameterError> {
    let Some(s) = present(raw) else {
        return Ok(None);
    };
    let ts = s.parse::<u64>().map_err(|_| ParameterError::InvalidUnsigned {
        name,
        value: s.to_string(),
    })?;
    Ok((ts != 0).then_some(ts))
}

/// Removes every quote character, tolerating `'[1, 2]'` style input.
fn unquote(raw: &str) -> String {
    csv_io::strip_quotes(raw)
}

// --- Search ---

/// Raw search input as collected from flags.
#[derive(Debug, Clone, Default)]
pub struct SearchInput<'a> {
    /// JSON `list[list[float]]` literal, or a path/URL to a header-less CSV file.
    pub data: &'a str,
    pub anns_field: &'a str,
    pub metric_type: &'a str,
    /// Already split `name:value` pairs.
    pub params: &'a [String],
    pub limit: &'a str,
    pub expr: Option<&'a str>,
    pub partition_names: Option<&'a str>,
    pub timeout: Option<&'a str>,
    pub round_decimal: Option<&'a str>,
    /// Whether the target collection has an index. Brute-force search takes no parameters.
    pub has_index: bool,
    /// Index type of the target field, when known. Narrows the accepted parameter names.
    pub index_type: Option<IndexType>,
    pub guarantee_timestamp: Option<&'a str>,
    pub travel_timestamp: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchParam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricType>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub data: Vec<Vec<f32>>,
    pub anns_field: String,
    pub param: SearchParam,
    pub limit: u64,
    pub expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_decimal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guarantee_timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_timestamp: Option<u64>,
}

/// Loads the query vectors from a JSON literal or, when `raw` names a `.csv` file, from the
/// first column of that file.
pub async fn load_search_data(
    raw: &str,
    fetch_timeout: Duration,
    progress: &dyn Progress,
) -> Result<Vec<Vec<f32>>, CliError> {
    if raw.contains(".csv") {
        let path = unquote(raw.trim());
        let table = csv_io::read_csv_file(&path, false, fetch_timeout, progress).await?;
        let column = table
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ParameterError::InvalidSearchData(format!("`{}` has no rows", path)))?;
        return serde_json::from_value(Value::Array(column))
            .map_err(|e| ParameterError::InvalidSearchData(e.to_string()).into());
    }
    serde_json::from_str(&unquote(raw))
        .map_err(|e| ParameterError::InvalidSearchData(e.to_string()).into())
}

fn validate_search_param_list(
    params: &[String],
    allowed: &BTreeSet<&'static str>,
) -> Result<BTreeMap<String, i64>, ParameterError> {
    let mut parsed = BTreeMap::new();
    for raw in params {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (name, value) =
            split_pair(raw).ok_or_else(|| ParameterError::MalformedSearchParam(raw.to_string()))?;
        if !allowed.contains(name) {
            return Err(ParameterError::UnknownSearchParam {
                got: name.to_string(),
                expected: vocabulary(allowed.iter().copied()),
            });
        }
        parsed.insert(name.to_string(), parse_int_param(name, value)?);
    }
    Ok(parsed)
}

pub async fn validate_search_params(
    input: &SearchInput<'_>,
    fetch_timeout: Duration,
    progress: &dyn Progress,
) -> Result<SearchRequest, CliError> {
    let data = load_search_data(input.data, fetch_timeout, progress).await?;

    if input.anns_field.is_empty() {
        return Err(ParameterError::MissingAnnsField.into());
    }

    let param = if input.has_index {
        let metric_type: MetricType = input.metric_type.parse()?;
        let allowed = input
            .index_type
            .map(search_params_for)
            .unwrap_or_else(all_search_param_names);
        SearchParam {
            metric_type: Some(metric_type),
            params: validate_search_param_list(input.params, allowed)?,
        }
    } else {
        SearchParam::default()
    };

    let limit = input
        .limit
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|l| *l > 0)
        .ok_or_else(|| ParameterError::InvalidLimit(input.limit.to_string()))?;

    let round_decimal = present(input.round_decimal)
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| ParameterError::InvalidRoundDecimal(s.to_string()))
        })
        .transpose()?;

    let request = SearchRequest {
        data,
        anns_field: input.anns_field.to_string(),
        param,
        limit,
        expr: input
            .expr
            .filter(|e| !e.trim().is_empty())
            .map(str::to_string),
        partition_names: optional_names(input.partition_names),
        timeout: optional_timeout(input.timeout)?,
        round_decimal,
        guarantee_timestamp: optional_timestamp("guarantee_timestamp", input.guarantee_timestamp)?,
        travel_timestamp: optional_timestamp("travel_timestamp", input.travel_timestamp)?,
    };
    debug!(
        "Validated search: {} queries on '{}', limit {}",
        request.data.len(),
        request.anns_field,
        request.limit
    );
    Ok(request)
}

// --- Query ---

#[derive(Debug, Clone, Default)]
pub struct QueryInput<'a> {
    pub expr: &'a str,
    pub partition_names: Option<&'a str>,
    pub output_fields: Option<&'a str>,
    pub timeout: Option<&'a str>,
    pub guarantee_timestamp: Option<&'a str>,
    pub graceful_time: Option<&'a str>,
    pub travel_timestamp: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub expr: String,
    pub output_fields: Option<Vec<String>>,
    pub partition_names: Option<Vec<String>>,
    pub timeout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guarantee_timestamp: Option<u64>,
    /// Only set when it differs from [`DEFAULT_GRACEFUL_TIME`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graceful_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_timestamp: Option<u64>,
}

pub fn validate_query_params(input: &QueryInput<'_>) -> Result<QueryRequest, ParameterError> {
    let expr = input.expr;
    if expr.trim().is_empty() {
        return Err(ParameterError::EmptyExpression);
    }
    if !OPERATORS.iter().any(|op| expr.contains(op)) {
        return Err(ParameterError::UnsupportedExpressionGrammar {
            expr: expr.to_string(),
            operators: vocabulary(OPERATORS),
        });
    }

    let graceful_time = match present(input.graceful_time) {
        None => None,
        Some(s) => {
            let secs = s.parse::<u64>().map_err(|_| ParameterError::InvalidUnsigned {
                name: "graceful_time",
                value: s.to_string(),
            })?;
            (secs != DEFAULT_GRACEFUL_TIME).then_some(secs)
        }
    };

    Ok(QueryRequest {
        expr: expr.to_string(),
        output_fields: optional_names(input.output_fields),
        partition_names: optional_names(input.partition_names),
        timeout: optional_timeout(input.timeout)?,
        guarantee_timestamp: optional_timestamp("guarantee_timestamp", input.guarantee_timestamp)?,
        graceful_time,
        travel_timestamp: optional_timestamp("travel_timestamp", input.travel_timestamp)?,
    })
}

// --- Distance calculation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    Float,
    Binary,
}

impl FromStr for VectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float_vectors" | "float" => Ok(VectorKind::Float),
            "bin_vectors" | "binary" => Ok(VectorKind::Binary),
            other => Err(format!(
                "unknown vector type `{}`, expected float_vectors or bin_vectors",
                other
            )),
        }
    }
}

/// One side of `calc distance`, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOperand {
    Imported {
        ids: String,
        collection: String,
        partition: String,
        field: String,
    },
    Raw {
        kind: VectorKind,
        vectors: String,
    },
}

/// One side of `calc distance`, ready for the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorOperand {
    Imported {
        ids: Vec<i64>,
        collection: String,
        partition: String,
        field: String,
    },
    FloatVectors(Vec<Vec<f32>>),
    BinVectors(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcParams {
    pub metric_type: MetricType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqrt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dim: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcRequest {
    pub vectors_left: VectorOperand,
    pub vectors_right: VectorOperand,
    pub params: CalcParams,
    pub timeout: Option<f64>,
}

/// Encodes text with `unicode_escape` rules: printable ASCII as is, tab, newline, CR and backslash
/// escaped, everything else as `\xNN`, `\uNNNN` or `\UNNNNNNNN`.
fn unicode_escape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.extend_from_slice(b"\\\\"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            ' '..='~' => out.push(c as u8),
            c if (c as u32) < 0x100 => out.extend_from_slice(format!("\\x{:02x}", c as u32).as_bytes()),
            c if (c as u32) < 0x10000 => out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes()),
            c => out.extend_from_slice(format!("\\U{:08x}", c as u32).as_bytes()),
        }
    }
    out
}

/// `s` without its first `start` and last `end` characters, empty when too short.
fn char_slice(s: &str, start: usize, end: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < start + end {
        return String::new();
    }
    chars[start..chars.len() - end].iter().collect()
}

/// Parses the textual `[b'\x94', b'N', b'\xca']` form of a list of byte strings.
///
/// Brackets are dropped, tokens are split on `", "` and each token loses its `b'` prefix and
/// closing quote; the remaining text is re-encoded with `unicode_escape`.
pub fn parse_binary_vectors(raw: &str) -> Vec<Vec<u8>> {
    let inner = char_slice(raw.trim(), 1, 1);
    inner
        .split(", ")
        .map(|token| unicode_escape(&char_slice(token, 2, 1)))
        .collect()
}

fn validate_operand(operand: &RawOperand) -> Result<VectorOperand, ParameterError> {
    match operand {
        RawOperand::Imported {
            ids,
            collection,
            partition,
            field,
        } => {
            let ids: Vec<i64> = serde_json::from_str(&unquote(ids))
                .map_err(|e| ParameterError::InvalidIdsFormat(e.to_string()))?;
            if collection.is_empty() || partition.is_empty() || field.is_empty() {
                return Err(ParameterError::IncompleteImportSpec);
            }
            Ok(VectorOperand::Imported {
                ids,
                collection: collection.clone(),
                partition: partition.clone(),
                field: field.clone(),
            })
        }
        RawOperand::Raw {
            kind: VectorKind::Float,
            vectors,
        } => serde_json::from_str(&unquote(vectors))
            .map(VectorOperand::FloatVectors)
            .map_err(|e| ParameterError::InvalidVectorFormat(e.to_string())),
        RawOperand::Raw {
            kind: VectorKind::Binary,
            vectors,
        } => Ok(VectorOperand::BinVectors(parse_binary_vectors(vectors))),
    }
}

pub fn validate_calc_params(
    left: &RawOperand,
    right: &RawOperand,
    metric_type: &str,
    sqrt: Option<bool>,
    dim: Option<u32>,
    timeout: Option<&str>,
) -> Result<CalcRequest, ParameterError> {
    let vectors_left = validate_operand(left)?;
    let vectors_right = validate_operand(right)?;
    let metric_type: MetricType = metric_type.parse()?;

    let params = CalcParams {
        metric_type,
        sqrt: (metric_type == MetricType::L2).then(|| sqrt.unwrap_or(false)),
        dim: if metric_type.is_binary() { dim } else { None },
    };
    Ok(CalcRequest {
        vectors_left,
        vectors_right,
        params,
        timeout: optional_timeout(timeout)?,
    })
}

// --- Timestamp utilities ---

pub fn validate_hybrid_timestamp(raw: &str) -> Result<u64, ParameterError> {
    raw.trim()
        .parse()
        .map_err(|_| ParameterError::InvalidUnsigned {
            name: "hybridts",
            value: raw.to_string(),
        })
}

pub fn validate_unix_epoch(raw: &str) -> Result<f64, ParameterError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|e| e.is_finite() && *e >= 0.0)
        .ok_or_else(|| ParameterError::InvalidNumber {
            name: "epoch",
            value: raw.to_string(),
        })
}

pub fn validate_milliseconds(raw: Option<&str>) -> Result<f64, ParameterError> {
    match present(raw) {
        None => Ok(0.0),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|ms| ms.is_finite())
            .ok_or_else(|| ParameterError::InvalidNumber {
                name: "milliseconds",
                value: s.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_io::SilentProgress;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const NO_FETCH: Duration = Duration::from_secs(1);

    #[test]
    fn collection_happy_path() {
        let spec = validate_collection_parameter(
            "car",
            "id",
            &strings(&["id:INT64:primary", "vec:FLOAT_VECTOR:128"]),
        )
        .unwrap();
        assert_eq!(spec.fields.len(), 2);
        assert_eq!(spec.primary_field, "id");
        assert_eq!(spec.fields[1].dim(), Some(128));
        assert_eq!(spec.fields[0].description(), "primary");
        assert_eq!(spec.primary().map(|f| f.data_type), Some(FieldDataType::Int64));
    }

    #[test]
    fn collection_checks_run_in_order() {
        let fields = strings(&["id:INT64:x"]);
        assert_eq!(
            validate_collection_parameter("", "", &[]),
            Err(ParameterError::MissingCollectionName)
        );
        assert_eq!(
            validate_collection_parameter("c", "", &[]),
            Err(ParameterError::MissingPrimaryField)
        );
        assert_eq!(
            validate_collection_parameter("c", "id", &[]),
            Err(ParameterError::MissingFields)
        );
        assert_eq!(
            validate_collection_parameter("c", "id", &strings(&["id:INT64"])),
            Err(ParameterError::MalformedFieldSpec("id:INT64".into()))
        );
        assert!(matches!(
            validate_collection_parameter("c", "id", &strings(&["id:LONG:x"])),
            Err(ParameterError::InvalidFieldType { .. })
        ));
        assert_eq!(
            validate_collection_parameter("c", "id", &strings(&["id:INT64:x", "v:FLOAT_VECTOR:abc"])),
            Err(ParameterError::InvalidVectorDim("abc".into()))
        );
        assert_eq!(
            validate_collection_parameter("c", "pk", &fields),
            Err(ParameterError::PrimaryFieldNotFound("pk".into()))
        );
    }

    #[test]
    fn collection_rejects_duplicates_before_primary_lookup() {
        let fields = strings(&["a:INT64:x", "b:FLOAT:y", "a:BOOL:z"]);
        assert_eq!(
            validate_collection_parameter("c", "missing", &fields),
            Err(ParameterError::DuplicateFieldNames)
        );
    }

    #[test]
    fn collection_builder_flags() {
        let spec = validate_collection_parameter("c", "id", &strings(&["id:INT64:"]))
            .unwrap()
            .with_auto_id(true)
            .with_description("cars");
        assert!(spec.auto_id);
        assert_eq!(spec.description, "cars");
    }

    #[test]
    fn index_happy_path_and_foreign_param() {
        let spec = validate_index_parameter("IVF_FLAT", "L2", &strings(&["nlist:128"])).unwrap();
        assert_eq!(spec.index_type, IndexType::IvfFlat);
        assert_eq!(spec.params.get("nlist"), Some(&128));

        assert!(matches!(
            validate_index_parameter("IVF_FLAT", "L2", &strings(&["efConstruction:128"])),
            Err(ParameterError::UnknownIndexParam { .. })
        ));
    }

    #[test]
    fn index_failure_reasons() {
        assert!(matches!(
            validate_index_parameter("NSG", "L2", &[]),
            Err(ParameterError::InvalidIndexType { .. })
        ));
        assert!(matches!(
            validate_index_parameter("HNSW", "COSINE", &[]),
            Err(ParameterError::InvalidMetricType { .. })
        ));
        assert_eq!(
            validate_index_parameter("HNSW", "L2", &strings(&["M:8:1"])),
            Err(ParameterError::MalformedIndexParam("M:8:1".into()))
        );
        assert!(matches!(
            validate_index_parameter("HNSW", "L2", &strings(&["M:eight"])),
            Err(ParameterError::NonIntegerParamValue { .. })
        ));
        assert_eq!(
            validate_index_parameter("HNSW", "L2", &strings(&["M:8", "M:16"])),
            Err(ParameterError::DuplicateIndexParams)
        );
        assert!(validate_index_parameter("FLAT", "IP", &[]).unwrap().params.is_empty());
    }

    #[tokio::test]
    async fn search_with_index() {
        let params = strings(&["nprobe:10", ""]);
        let input = SearchInput {
            data: "[[0.1, 0.2], [0.3, 0.4]]",
            anns_field: "vec",
            metric_type: "L2",
            params: &params,
            limit: "2",
            expr: Some("id > 0"),
            partition_names: Some("_default, p1"),
            timeout: Some("1.5"),
            round_decimal: Some("5"),
            has_index: true,
            index_type: Some(IndexType::IvfFlat),
            guarantee_timestamp: Some("0"),
            travel_timestamp: Some("428960801420883491"),
        };
        let request = validate_search_params(&input, NO_FETCH, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(request.data, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        assert_eq!(request.param.metric_type, Some(MetricType::L2));
        assert_eq!(request.param.params.get("nprobe"), Some(&10));
        assert_eq!(request.limit, 2);
        assert_eq!(request.expr.as_deref(), Some("id > 0"));
        assert_eq!(request.partition_names, Some(strings(&["_default", "p1"])));
        assert_eq!(request.timeout, Some(1.5));
        assert_eq!(request.round_decimal, Some(5));
        assert_eq!(request.guarantee_timestamp, None);
        assert_eq!(request.travel_timestamp, Some(428960801420883491));
    }

    #[tokio::test]
    async fn search_without_index_drops_params() {
        let params = strings(&["bogus:1"]);
        let input = SearchInput {
            data: "'[[1, 2]]'",
            anns_field: "vec",
            metric_type: "",
            params: &params,
            limit: "3",
            ..Default::default()
        };
        let request = validate_search_params(&input, NO_FETCH, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(request.param, SearchParam::default());
        assert_eq!(request.expr, None);
        assert_eq!(request.partition_names, None);
        assert_eq!(request.timeout, None);
    }

    #[tokio::test]
    async fn search_narrows_params_to_index_type() {
        let params = strings(&["ef:64"]);
        let mut input = SearchInput {
            data: "[[1]]",
            anns_field: "vec",
            metric_type: "L2",
            params: &params,
            limit: "1",
            has_index: true,
            ..Default::default()
        };
        assert!(validate_search_params(&input, NO_FETCH, &SilentProgress).await.is_ok());

        input.index_type = Some(IndexType::IvfFlat);
        let err = validate_search_params(&input, NO_FETCH, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Parameter(ParameterError::UnknownSearchParam { .. })
        ));
    }

    #[tokio::test]
    async fn search_rejects_bad_limit_and_data() {
        let input = SearchInput {
            data: "[[1]]",
            anns_field: "vec",
            limit: "0",
            ..Default::default()
        };
        let err = validate_search_params(&input, NO_FETCH, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Parameter(ParameterError::InvalidLimit(_))));

        let input = SearchInput {
            data: "not json",
            anns_field: "vec",
            limit: "1",
            ..Default::default()
        };
        let err = validate_search_params(&input, NO_FETCH, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Parameter(ParameterError::InvalidSearchData(_))));

        let input = SearchInput {
            data: "[[1]]",
            anns_field: "",
            limit: "1",
            ..Default::default()
        };
        let err = validate_search_params(&input, NO_FETCH, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Parameter(ParameterError::MissingAnnsField)));
    }

    #[test]
    fn query_operators() {
        let ok = validate_query_params(&QueryInput {
            expr: "id in [1,2,3]",
            output_fields: Some("color, brand"),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ok.expr, "id in [1,2,3]");
        assert_eq!(ok.output_fields, Some(strings(&["color", "brand"])));
        assert_eq!(ok.partition_names, None);
        assert_eq!(ok.graceful_time, None);

        assert!(matches!(
            validate_query_params(&QueryInput {
                expr: "id equals 3",
                ..Default::default()
            }),
            Err(ParameterError::UnsupportedExpressionGrammar { .. })
        ));
        assert_eq!(
            validate_query_params(&QueryInput::default()),
            Err(ParameterError::EmptyExpression)
        );
    }

    #[test]
    fn query_keeps_expression_verbatim_and_bounds_timeout() {
        let request = validate_query_params(&QueryInput {
            expr: " id > 1 ",
            ..Default::default()
        })
        .unwrap();
        assert_eq!(request.expr, " id > 1 ");

        assert_eq!(
            validate_query_params(&QueryInput {
                expr: "   ",
                ..Default::default()
            }),
            Err(ParameterError::EmptyExpression)
        );
        assert_eq!(
            validate_query_params(&QueryInput {
                expr: "id > 1",
                timeout: Some("1e300"),
                ..Default::default()
            }),
            Err(ParameterError::InvalidTimeout("1e300".into()))
        );
    }

    #[tokio::test]
    async fn search_data_from_csv_takes_first_column() {
        let dir = tempfile::Builder::new().prefix("milvus-cli").tempdir().unwrap();
        let path = dir.path().join("queries.csv");
        std::fs::write(&path, "\"[0.1, 0.2]\",1\n\"[0.3, 0.4]\",2\n").unwrap();
        let data = format!("'{}'", path.display());

        let input = SearchInput {
            data: &data,
            anns_field: "vector",
            limit: "2",
            expr: Some(" id > 0"),
            ..Default::default()
        };
        let request = validate_search_params(&input, NO_FETCH, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(request.data, vec![vec![0.1f32, 0.2], vec![0.3, 0.4]]);
        assert_eq!(request.expr.as_deref(), Some(" id > 0"));
    }

    #[test]
    fn query_graceful_time_only_when_not_default() {
        let base = QueryInput {
            expr: "id > 1",
            graceful_time: Some("5"),
            ..Default::default()
        };
        assert_eq!(validate_query_params(&base).unwrap().graceful_time, None);

        let custom = QueryInput {
            graceful_time: Some("10"),
            timeout: Some("2"),
            guarantee_timestamp: Some("12"),
            ..base
        };
        let request = validate_query_params(&custom).unwrap();
        assert_eq!(request.graceful_time, Some(10));
        assert_eq!(request.timeout, Some(2.0));
        assert_eq!(request.guarantee_timestamp, Some(12));
    }

    #[test]
    fn binary_literal_keeps_escaped_bytes() {
        let parsed = parse_binary_vectors(r"[b'\x94', b'N', b'\xca']");
        assert_eq!(
            parsed,
            vec![b"\\\\x94".to_vec(), b"N".to_vec(), b"\\\\xca".to_vec()]
        );
        assert_eq!(parse_binary_vectors("[b'Ê']"), vec![b"\\xca".to_vec()]);
        assert_eq!(parse_binary_vectors("[]"), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn calc_attaches_metric_specific_params() {
        let float = RawOperand::Raw {
            kind: VectorKind::Float,
            vectors: "[[1.0, 2.0]]".into(),
        };
        let request = validate_calc_params(&float, &float, "L2", Some(true), Some(8), None).unwrap();
        assert_eq!(request.params.sqrt, Some(true));
        assert_eq!(request.params.dim, None);

        let bin = RawOperand::Raw {
            kind: VectorKind::Binary,
            vectors: "[b'N']".into(),
        };
        let request = validate_calc_params(&bin, &bin, "HAMMING", Some(true), Some(8), Some("3")).unwrap();
        assert_eq!(request.params.sqrt, None);
        assert_eq!(request.params.dim, Some(8));
        assert_eq!(request.timeout, Some(3.0));

        assert!(matches!(
            validate_calc_params(&float, &float, "COSINE", None, None, None),
            Err(ParameterError::InvalidMetricType { .. })
        ));
    }

    #[test]
    fn calc_imported_operand_checks() {
        let imported = RawOperand::Imported {
            ids: "[1, 2]".into(),
            collection: "car".into(),
            partition: "_default".into(),
            field: "vec".into(),
        };
        let raw = RawOperand::Raw {
            kind: VectorKind::Float,
            vectors: "[[1.0]]".into(),
        };
        let request = validate_calc_params(&imported, &raw, "IP", None, None, None).unwrap();
        assert_eq!(
            request.vectors_left,
            VectorOperand::Imported {
                ids: vec![1, 2],
                collection: "car".into(),
                partition: "_default".into(),
                field: "vec".into(),
            }
        );

        let bad_ids = RawOperand::Imported {
            ids: "1, 2".into(),
            collection: "car".into(),
            partition: "_default".into(),
            field: "vec".into(),
        };
        assert!(matches!(
            validate_calc_params(&bad_ids, &raw, "IP", None, None, None),
            Err(ParameterError::InvalidIdsFormat(_))
        ));

        let incomplete = RawOperand::Imported {
            ids: "[1]".into(),
            collection: "car".into(),
            partition: String::new(),
            field: "vec".into(),
        };
        assert_eq!(
            validate_calc_params(&incomplete, &raw, "IP", None, None, None),
            Err(ParameterError::IncompleteImportSpec)
        );

        let bad_vectors = RawOperand::Raw {
            kind: VectorKind::Float,
            vectors: "[[a]]".into(),
        };
        assert!(matches!(
            validate_calc_params(&raw, &bad_vectors, "IP", None, None, None),
            Err(ParameterError::InvalidVectorFormat(_))
        ));
    }

    #[test]
    fn timestamp_inputs() {
        assert_eq!(validate_hybrid_timestamp("429164525386203142"), Ok(429164525386203142));
        assert!(validate_hybrid_timestamp("-1").is_err());
        assert_eq!(validate_unix_epoch("1634525261.25"), Ok(1634525261.25));
        assert!(validate_unix_epoch("-3").is_err());
        assert_eq!(validate_milliseconds(None), Ok(0.0));
        assert_eq!(validate_milliseconds(Some("1.5")), Ok(1.5));
        assert!(validate_milliseconds(Some("x")).is_err());
    }
}
