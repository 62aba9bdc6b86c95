//! Database descriptor and collection-handle acquisition

use crate::config::DatabaseConfig;
use crate::driver::{CollectionHandle, ConnectionManager};
use crate::mongo::MongoConnector;
use crate::query::Query;
use crate::sanitize::sanitize_error;
use crate::validation::Validator;
use crate::{DocBridgeError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Message of every acquisition failure, whichever step failed
pub const ACQUIRE_FAILED: &str = "Failed to create database instance";

/// Logical database shared by the `Query` instances created on it
///
/// Holds no connection itself: each operation asks the connection manager
/// for a client, selects the database and then the collection.
pub struct Database {
    manager: Arc<dyn ConnectionManager>,
    config: DatabaseConfig,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.config.name)
            .field("validate_queries", &self.config.validate_queries)
            .finish()
    }
}

impl Database {
    /// Create a database descriptor backed by the given connection manager
    pub fn new(manager: Arc<dyn ConnectionManager>, config: DatabaseConfig) -> Self {
        Self { manager, config }
    }

    /// Create a database descriptor backed by the official MongoDB driver
    pub fn mongodb(config: DatabaseConfig) -> Self {
        let manager = Arc::new(MongoConnector::new(config.pool.clone()));
        Self::new(manager, config)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Get the database name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Shorthand for `Query::new(db.clone(), collection)`
    pub fn query(self: &Arc<Self>, collection: &str) -> Result<Query> {
        Query::new(Arc::clone(self), collection)
    }

    pub(crate) fn validator(&self) -> Validator {
        Validator::new(self.config.validate_queries)
    }

    /// Applies the configured redaction to a failure reason
    pub(crate) fn sanitize(&self, reason: &str) -> String {
        sanitize_error(reason, !self.config.sanitize_errors)
    }

    /// Resolves a live handle for `collection`.
    ///
    /// Connect, database selection and collection selection failures are all
    /// reported as the same `Connection` error. No retry is attempted.
    #[instrument(skip(self), fields(database = %self.config.name))]
    pub async fn acquire(&self, collection: &str) -> Result<Arc<dyn CollectionHandle>> {
        let client = self
            .manager
            .connect(&self.config.uri, &self.config.client_options)
            .await
            .map_err(|e| self.acquire_failed("connect", e))?;

        let db = client
            .db(&self.config.name, &self.config.db_options)
            .map_err(|e| self.acquire_failed("db", e))?;

        db.collection(collection)
            .map_err(|e| self.acquire_failed("collection", e))
    }

    fn acquire_failed(&self, step: &str, err: DocBridgeError) -> DocBridgeError {
        warn!(step, error = %self.sanitize(&err.to_string()), "Connection acquisition failed");
        DocBridgeError::Connection(ACQUIRE_FAILED.to_string())
    }

    /// Tears down the clients held by the connection manager
    pub async fn close(&self) -> Result<()> {
        self.manager.close().await
    }
}
