// Domain vocabulary: data types, index types, metric types and the index capability table

use once_cell::sync::Lazy;
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use crate::error::ParameterError;

// --- Constants ---

/// Relational and membership operators accepted in query expressions.
pub const OPERATORS: [&str; 7] = ["<", "<=", ">", ">=", "==", "!=", "in"];

/// Default graceful time (seconds) for bounded-consistency queries.
pub const DEFAULT_GRACEFUL_TIME: u64 = 5;

// --- Field data types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FieldDataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    BinaryVector,
    FloatVector,
}

impl FieldDataType {
    pub const ALL: [FieldDataType; 10] = [
        FieldDataType::Bool,
        FieldDataType::Int8,
        FieldDataType::Int16,
        FieldDataType::Int32,
        FieldDataType::Int64,
        FieldDataType::Float,
        FieldDataType::Double,
        FieldDataType::String,
        FieldDataType::BinaryVector,
        FieldDataType::FloatVector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldDataType::Bool => "BOOL",
            FieldDataType::Int8 => "INT8",
            FieldDataType::Int16 => "INT16",
            FieldDataType::Int32 => "INT32",
            FieldDataType::Int64 => "INT64",
            FieldDataType::Float => "FLOAT",
            FieldDataType::Double => "DOUBLE",
            FieldDataType::String => "STRING",
            FieldDataType::BinaryVector => "BINARY_VECTOR",
            FieldDataType::FloatVector => "FLOAT_VECTOR",
        }
    }

    /// Numeric code the server uses for this type.
    pub fn code(&self) -> u32 {
        match self {
            FieldDataType::Bool => 1,
            FieldDataType::Int8 => 2,
            FieldDataType::Int16 => 3,
            FieldDataType::Int32 => 4,
            FieldDataType::Int64 => 5,
            FieldDataType::Float => 10,
            FieldDataType::Double => 11,
            FieldDataType::String => 20,
            FieldDataType::BinaryVector => 100,
            FieldDataType::FloatVector => 101,
        }
    }

    /// Inverse of [`FieldDataType::code`]. `0` (NONE) and `999` (UNKNOWN) have no variant.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, FieldDataType::BinaryVector | FieldDataType::FloatVector)
    }
}

impl fmt::Display for FieldDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldDataType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParameterError::InvalidFieldType {
                got: s.to_string(),
                expected: vocabulary(Self::ALL.iter().map(|t| t.as_str())),
            })
    }
}

/// Label for a numeric data-type code as shown by `describe`.
pub fn data_type_label(code: u32) -> &'static str {
    match code {
        0 => "NONE",
        other => FieldDataType::from_code(other)
            .map(|t| t.as_str())
            .unwrap_or("UNKNOWN"),
    }
}

// --- Index types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum IndexType {
    Flat,
    IvfFlat,
    IvfSq8,
    IvfPq,
    Rnsg,
    Hnsw,
    Annoy,
}

impl IndexType {
    pub const ALL: [IndexType; 7] = [
        IndexType::Flat,
        IndexType::IvfFlat,
        IndexType::IvfSq8,
        IndexType::IvfPq,
        IndexType::Rnsg,
        IndexType::Hnsw,
        IndexType::Annoy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Flat => "FLAT",
            IndexType::IvfFlat => "IVF_FLAT",
            IndexType::IvfSq8 => "IVF_SQ8",
            IndexType::IvfPq => "IVF_PQ",
            IndexType::Rnsg => "RNSG",
            IndexType::Hnsw => "HNSW",
            IndexType::Annoy => "ANNOY",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParameterError::InvalidIndexType {
                got: s.to_string(),
                expected: vocabulary(Self::ALL.iter().map(|t| t.as_str())),
            })
    }
}

// --- Metric types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MetricType {
    L2,
    Ip,
    Hamming,
    Tanimoto,
}

impl MetricType {
    pub const ALL: [MetricType; 4] = [
        MetricType::L2,
        MetricType::Ip,
        MetricType::Hamming,
        MetricType::Tanimoto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::L2 => "L2",
            MetricType::Ip => "IP",
            MetricType::Hamming => "HAMMING",
            MetricType::Tanimoto => "TANIMOTO",
        }
    }

    /// Metrics defined over binary vectors.
    pub fn is_binary(&self) -> bool {
        matches!(self, MetricType::Hamming | MetricType::Tanimoto)
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParameterError::InvalidMetricType {
                got: s.to_string(),
                expected: vocabulary(Self::ALL.iter().map(|t| t.as_str())),
            })
    }
}

// --- Index capability table ---

/// Build-time and search-time parameter names supported by one index type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTypeDescriptor {
    pub build_params: BTreeSet<&'static str>,
    pub search_params: BTreeSet<&'static str>,
}

impl IndexTypeDescriptor {
    fn new(build: &[&'static str], search: &[&'static str]) -> Self {
        Self {
            build_params: build.iter().copied().collect(),
            search_params: search.iter().copied().collect(),
        }
    }
}

static INDEX_TYPES: Lazy<BTreeMap<IndexType, IndexTypeDescriptor>> = Lazy::new(|| {
    BTreeMap::from([
        (IndexType::Flat, IndexTypeDescriptor::new(&[], &["metric_type"])),
        (IndexType::IvfFlat, IndexTypeDescriptor::new(&["nlist"], &["nprobe"])),
        (IndexType::IvfSq8, IndexTypeDescriptor::new(&["nlist"], &["nprobe"])),
        (
            IndexType::IvfPq,
            IndexTypeDescriptor::new(&["nlist", "m", "nbits"], &["nprobe"]),
        ),
        (
            IndexType::Rnsg,
            IndexTypeDescriptor::new(
                &["out_degree", "candidate_pool_size", "search_length", "knng"],
                &["search_length"],
            ),
        ),
        (
            IndexType::Hnsw,
            IndexTypeDescriptor::new(&["M", "efConstruction"], &["ef"]),
        ),
        (IndexType::Annoy, IndexTypeDescriptor::new(&["n_trees"], &["search_k"])),
    ])
});

static SEARCH_PARAMS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    INDEX_TYPES
        .values()
        .flat_map(|d| d.search_params.iter().copied())
        .collect()
});

pub fn descriptor(index_type: IndexType) -> &'static IndexTypeDescriptor {
    // Every variant is inserted above; check_vocabulary() verifies it at startup.
    &INDEX_TYPES[&index_type]
}

pub fn build_params_for(index_type: IndexType) -> &'static BTreeSet<&'static str> {
    &descriptor(index_type).build_params
}

pub fn search_params_for(index_type: IndexType) -> &'static BTreeSet<&'static str> {
    &descriptor(index_type).search_params
}

/// Union of the search parameters of every index type.
pub fn all_search_param_names() -> &'static BTreeSet<&'static str> {
    &SEARCH_PARAMS
}

pub fn is_valid_field_type(s: &str) -> bool {
    s.parse::<FieldDataType>().is_ok()
}

pub fn is_valid_index_type(s: &str) -> bool {
    s.parse::<IndexType>().is_ok()
}

pub fn is_valid_metric_type(s: &str) -> bool {
    s.parse::<MetricType>().is_ok()
}

/// Verifies the static tables once at startup. A failure here is a build defect, not user error.
pub fn check_vocabulary() -> Result<(), String> {
    for index_type in IndexType::ALL {
        let Some(desc) = INDEX_TYPES.get(&index_type) else {
            return Err(format!("index type {} has no descriptor", index_type));
        };
        if desc.search_params.is_empty() {
            return Err(format!("index type {} declares no search parameters", index_type));
        }
    }
    if INDEX_TYPES.len() != IndexType::ALL.len() {
        return Err("index table has entries for unknown index types".to_string());
    }
    Ok(())
}

/// Formats a closed set as `['A', 'B']` for error messages.
pub fn vocabulary<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = items.into_iter().map(|s| format!("'{}'", s)).collect();
    format!("[{}]", quoted.join(", "))
}
