// Connection defaults and timeouts shared by a session

use std::time::Duration;

use crate::{csv_io::DEFAULT_FETCH_TIMEOUT, service::Connection};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 19530;
pub const DEFAULT_ALIAS: &str = "default";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings shared by every command in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    pub host: String,
    pub port: u16,
    pub alias: String,
    pub token: Option<String>,
    /// Upper bound for fetching a remote CSV file.
    pub fetch_timeout: Duration,
    /// Default timeout for REST requests that carry no explicit one.
    pub request_timeout: Duration,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            alias: DEFAULT_ALIAS.to_string(),
            token: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl CliConfig {
    /// Connection handle for `alias`, defaulting host and port to this configuration.
    pub fn connection(&self, alias: Option<&str>, host: Option<&str>, port: Option<u16>) -> Connection {
        Connection::new(
            alias.unwrap_or(&self.alias),
            host.unwrap_or(&self.host),
            port.unwrap_or(self.port),
        )
        .with_token(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_falls_back_to_defaults() {
        let config = CliConfig::default();
        let conn = config.connection(None, None, None);
        assert_eq!(conn.alias, "default");
        assert_eq!(conn.host, "127.0.0.1");
        assert_eq!(conn.port, 19530);

        let conn = config.connection(Some("replica"), Some("10.0.0.2"), Some(19531));
        assert_eq!(conn.alias, "replica");
        assert_eq!(conn.port, 19531);
    }

    #[test]
    fn token_carries_into_connections() {
        let config = CliConfig {
            token: Some("root:Milvus".into()),
            ..CliConfig::default()
        };
        assert_eq!(config.connection(None, None, None).token.as_deref(), Some("root:Milvus"));
    }
}
