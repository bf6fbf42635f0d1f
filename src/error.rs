// Error taxonomy shared by the validators, CSV ingestion and the service facade

use thiserror::Error;

/// Result alias for command-level operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// Coarse classification used at the command boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-vocabulary user input.
    Parameter,
    /// The service is unreachable or refused the connection.
    Connection,
    /// Filesystem or network failure while reading/writing CSV data.
    Io,
    /// The service rejected a well-formed request.
    RemoteOperation,
}

/// Every reason a validator can reject its input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Missing collection name.")]
    MissingCollectionName,

    #[error("Missing primary field.")]
    MissingPrimaryField,

    #[error("Missing fields.")]
    MissingFields,

    #[error("Field `{0}` should contain three parameters concatenated by \":\".")]
    MalformedFieldSpec(String),

    #[error("Invalid field data type `{got}`, should be one of {expected}")]
    InvalidFieldType { got: String, expected: String },

    #[error("Vector's dim should be a positive int, got `{0}`.")]
    InvalidVectorDim(String),

    #[error("Field names are duplicated.")]
    DuplicateFieldNames,

    #[error("Primary field name `{0}` doesn't exist in input fields.")]
    PrimaryFieldNotFound(String),

    #[error("Invalid index type `{got}`, should be one of {expected}")]
    InvalidIndexType { got: String, expected: String },

    #[error("Invalid metric type `{got}`, should be one of {expected}")]
    InvalidMetricType { got: String, expected: String },

    #[error("Index param `{0}` should contain two parameters concatenated by \":\".")]
    MalformedIndexParam(String),

    #[error("Invalid index param `{got}`, should be one of {expected}")]
    UnknownIndexParam { got: String, expected: String },

    #[error("Param `{name}` should be an int, got `{value}`.")]
    NonIntegerParamValue { name: String, value: String },

    #[error("Index params are duplicated.")]
    DuplicateIndexParams,

    #[error("Search param `{0}` should contain two parameters concatenated by \":\".")]
    MalformedSearchParam(String),

    #[error("Invalid search parameter `{got}`, should be one of {expected}")]
    UnknownSearchParam { got: String, expected: String },

    #[error("Format(list[list[float]]) \"data\" error! {0}")]
    InvalidSearchData(String),

    #[error("annsField is empty!")]
    MissingAnnsField,

    #[error("Format(positive int) \"limit\" error! got `{0}`")]
    InvalidLimit(String),

    #[error("Format(float) \"timeout\" error! got `{0}`")]
    InvalidTimeout(String),

    #[error("Format(int) \"round_decimal\" error! got `{0}`")]
    InvalidRoundDecimal(String),

    #[error("Format(uint64) \"{name}\" error! got `{value}`")]
    InvalidUnsigned { name: &'static str, value: String },

    #[error("Format(float) \"{name}\" error! got `{value}`")]
    InvalidNumber { name: &'static str, value: String },

    #[error("expr is empty!")]
    EmptyExpression,

    #[error("The query expression only accepts \"<field_name> <operator in {operators}> <value>\", got `{expr}`")]
    UnsupportedExpressionGrammar { expr: String, operators: String },

    #[error("Format(list[int]) \"ids\" error! {0}")]
    InvalidIdsFormat(String),

    #[error("Collection/Partition/Field should not be empty!")]
    IncompleteImportSpec,

    #[error("Format(list[list[float]]) \"vectors\" error! {0}")]
    InvalidVectorFormat(String),

    #[error("Vector dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Failures while reading or writing CSV files.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("Path is empty or target file is not .csv: `{0}`")]
    InvalidPath(String),

    #[error("File is too large ({size} bytes)! Only allow csv files less than {limit} bytes.")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Cell at row {row}, column {column} is not valid JSON: {source}")]
    MalformedCell {
        row: usize,
        column: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Timed out fetching `{0}`")]
    NetworkTimeout(String),

    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error fetching `{url}`: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Content of `{0}` is not valid UTF-8")]
    Encoding(String),
}

impl CsvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CsvError::InvalidPath(_) | CsvError::FileTooLarge { .. } | CsvError::MalformedCell { .. } => {
                ErrorKind::Parameter
            }
            _ => ErrorKind::Io,
        }
    }
}

/// Top-level error surfaced by a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Csv(#[from] CsvError),

    /// The command line itself could not be parsed.
    #[error("{0}")]
    Usage(String),

    #[error("Connect to Milvus error! {0}")]
    Connection(String),

    #[error("No connection for alias `{0}`. Run `connect` first.")]
    NotConnected(String),

    #[error("Milvus rejected `{operation}`: {message}")]
    RemoteOperation { operation: String, message: String },
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::Parameter(_) | CliError::Usage(_) => ErrorKind::Parameter,
            CliError::Csv(e) => e.kind(),
            CliError::Connection(_) | CliError::NotConnected(_) => ErrorKind::Connection,
            CliError::RemoteOperation { .. } => ErrorKind::RemoteOperation,
        }
    }

    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CliError::RemoteOperation {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
