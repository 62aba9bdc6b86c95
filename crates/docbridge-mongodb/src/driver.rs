//! Boundary with the connection manager and driver handles
//!
//! The query layer never talks to a driver directly. It goes through these
//! traits, which mirror the handle chain `connect -> db -> collection`.
//! Raw results are returned as BSON and classified by [`crate::normalize`].

use crate::pipeline::UpdateSpec;
use crate::Result;
use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use std::sync::Arc;

/// Supplies client handles and owns any process-scoped client state
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// Returns a client for `uri`, establishing one if needed
    async fn connect(&self, uri: &str, options: &BsonDocument) -> Result<Arc<dyn ClientHandle>>;

    /// Tears down every client this manager created
    async fn close(&self) -> Result<()>;
}

pub trait ClientHandle: Send + Sync {
    fn db(&self, name: &str, options: &BsonDocument) -> Result<Arc<dyn DbHandle>>;
}

pub trait DbHandle: Send + Sync {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>>;
}

/// Operations available on one collection
///
/// Every method returns the driver's raw result. `aggregate` returns the
/// fully drained cursor.
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    async fn count(&self, filter: BsonDocument, options: Option<BsonDocument>) -> Result<Bson>;

    async fn aggregate(
        &self,
        pipeline: Vec<BsonDocument>,
        options: Option<BsonDocument>,
    ) -> Result<Bson>;

    async fn delete_one(&self, query: BsonDocument, options: Option<BsonDocument>)
        -> Result<Bson>;

    async fn delete_many(
        &self,
        query: BsonDocument,
        options: Option<BsonDocument>,
    ) -> Result<Bson>;

    async fn update_one(
        &self,
        query: BsonDocument,
        update: UpdateSpec,
        options: Option<BsonDocument>,
    ) -> Result<Bson>;

    async fn update_many(
        &self,
        query: BsonDocument,
        update: UpdateSpec,
        options: Option<BsonDocument>,
    ) -> Result<Bson>;

    /// Bulk operator that stops at the first failing operation.
    ///
    /// `options` apply to the whole batch when it is executed.
    fn initialize_ordered_bulk_op(
        &self,
        options: Option<BsonDocument>,
    ) -> Result<Box<dyn BulkOperator>>;

    /// Bulk operator that applies every operation and reports the aggregate
    fn initialize_unordered_bulk_op(
        &self,
        options: Option<BsonDocument>,
    ) -> Result<Box<dyn BulkOperator>>;
}

/// Write-batching operator: accumulates operations until `execute`
#[async_trait]
pub trait BulkOperator: Send {
    fn insert(&mut self, document: BsonDocument) -> Result<()>;

    fn update_one(&mut self, query: BsonDocument, update: UpdateSpec, upsert: bool) -> Result<()>;

    fn update_many(&mut self, query: BsonDocument, update: UpdateSpec, upsert: bool)
        -> Result<()>;

    fn delete_one(&mut self, query: BsonDocument) -> Result<()>;

    fn delete_many(&mut self, query: BsonDocument) -> Result<()>;

    /// Number of operations accumulated so far
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Submits the batch and returns the raw result
    async fn execute(self: Box<Self>) -> Result<Bson>;
}
