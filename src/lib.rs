pub mod commands;
pub mod config;
pub mod csv_io;
pub mod distance;
pub mod error;
pub mod format;
pub mod service;
pub mod service_rest;
pub mod timestamp;
pub mod types;
pub mod validation;

// Re-export commonly used types for the binary and integration tests
pub use commands::{Outcome, Session};
pub use config::CliConfig;
pub use error::{CliError, ErrorKind, ParameterError, Result};
pub use service::{Connection, MilvusService};
