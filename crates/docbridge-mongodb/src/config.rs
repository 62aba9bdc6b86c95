//! Connection pool and database configuration

use bson::{Bson, Document as BsonDocument};
use std::time::Duration;

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (default: 0)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 10)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: Some(0),
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("docbridge".to_string()),
        }
    }
}

impl PoolConfig {
    /// Returns a copy with driver-style client options applied on top.
    ///
    /// Recognized keys: `minPoolSize`, `maxPoolSize`, `maxIdleTimeMS`,
    /// `connectTimeoutMS`, `serverSelectionTimeoutMS`, `appName`.
    /// Unknown keys and values of the wrong type are ignored.
    pub fn merge_document(&self, options: &BsonDocument) -> Self {
        let mut merged = self.clone();

        for (key, value) in options {
            match key.as_str() {
                "minPoolSize" => {
                    if let Some(n) = as_u32(value) {
                        merged.min_pool_size = Some(n);
                    }
                }
                "maxPoolSize" => {
                    if let Some(n) = as_u32(value) {
                        merged.max_pool_size = Some(n);
                    }
                }
                "maxIdleTimeMS" => {
                    if let Some(ms) = as_u64(value) {
                        merged.max_idle_time = Some(Duration::from_millis(ms));
                    }
                }
                "connectTimeoutMS" => {
                    if let Some(ms) = as_u64(value) {
                        merged.connect_timeout = Some(Duration::from_millis(ms));
                    }
                }
                "serverSelectionTimeoutMS" => {
                    if let Some(ms) = as_u64(value) {
                        merged.server_selection_timeout = Some(Duration::from_millis(ms));
                    }
                }
                "appName" => {
                    if let Bson::String(name) = value {
                        merged.app_name = Some(name.clone());
                    }
                }
                _ => {}
            }
        }

        merged
    }
}

fn as_u64(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        Bson::Double(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
        _ => None,
    }
}

fn as_u32(value: &Bson) -> Option<u32> {
    as_u64(value).and_then(|n| u32::try_from(n).ok())
}

/// Logical database descriptor shared by every `Query` on it
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URI handed to the connection manager
    pub uri: String,
    /// Logical database name
    pub name: String,
    /// Options passed to `connect`
    pub client_options: BsonDocument,
    /// Options passed when selecting the database
    pub db_options: BsonDocument,
    /// Reject filters and pipelines that run server-side JavaScript (default: true)
    pub validate_queries: bool,
    /// Redact connection details from operational-failure reasons (default: true)
    pub sanitize_errors: bool,
    /// Pool settings used by the MongoDB adapter
    pub pool: PoolConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            name: "test".to_string(),
            client_options: BsonDocument::new(),
            db_options: BsonDocument::new(),
            validate_queries: true,
            sanitize_errors: true,
            pool: PoolConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Create a config for the given URI and database name with default settings
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the options passed to `connect`
    pub fn client_options(mut self, options: BsonDocument) -> Self {
        self.client_options = options;
        self
    }

    /// Set the options passed when selecting the database
    pub fn db_options(mut self, options: BsonDocument) -> Self {
        self.db_options = options;
        self
    }

    /// Enable or disable rejection of JavaScript operators
    pub fn validate_queries(mut self, enabled: bool) -> Self {
        self.validate_queries = enabled;
        self
    }

    /// Enable or disable redaction of failure reasons
    pub fn sanitize_errors(mut self, enabled: bool) -> Self {
        self.sanitize_errors = enabled;
        self
    }

    /// Set the pool configuration
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}
