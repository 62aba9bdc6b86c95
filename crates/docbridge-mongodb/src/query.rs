//! Per-collection operation surface
//!
//! Every method follows the same path: validate the arguments, acquire a
//! collection handle, run the translated driver call and classify the raw
//! result. Methods differ only in payload and in how operational failures
//! are reported:
//!
//! | method                      | operational failure            |
//! |-----------------------------|--------------------------------|
//! | `count`                     | `Err(Operation)`               |
//! | `find_one`                  | `Err(Operation)`, or `None` for an empty/malformed result |
//! | `aggregate`                 | empty `Vec`                    |
//! | `remove_*`, `update_*`      | `false`                        |
//! | `insert_many`               | `false`                        |
//! | `insert_one`, `bulk_ops`    | `None`                         |
//!
//! Invalid arguments are always `Err(Validation)` and never reach the
//! connection manager.

use crate::bulk::{self, BulkPlan, BulkStage, BulkWriteSummary, BulkWriter};
use crate::connection::Database;
use crate::normalize::{self, Normalized};
use crate::pipeline::{self, CountPlan};
use crate::validation::{Operation, ValidatedCollectionName};
use crate::{DocBridgeError, Result};
use bson::{Bson, Document as BsonDocument};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Operations on one collection of a [`Database`]
#[derive(Debug, Clone)]
pub struct Query {
    db: Arc<Database>,
    name: ValidatedCollectionName,
}

impl Query {
    /// Create a query surface for `collection`
    ///
    /// # Errors
    /// Returns a validation error if the collection name is invalid.
    pub fn new(db: Arc<Database>, collection: &str) -> Result<Self> {
        let name = ValidatedCollectionName::new(collection)?;
        Ok(Self { db, name })
    }

    /// Get the collection name
    pub fn collection_name(&self) -> &str {
        self.name.as_str()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn failed(&self, op: Operation, reason: &str) -> DocBridgeError {
        op.failed(self.db.sanitize(reason))
    }

    fn or_default<T>(&self, op: Operation, result: Result<T>, default: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    operation = %op,
                    collection = %self.name,
                    reason = %self.db.sanitize(e.reason()),
                    "Operation failed, returning default"
                );
                default
            }
        }
    }

    /// Counts matching documents.
    ///
    /// An object (or absent) filter uses the native count; an array filter is
    /// run as a pipeline ending in `$count`.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn count(&self, filter: Option<Bson>, options: Option<Bson>) -> Result<u64> {
        let op = Operation::Count;
        let (filter, options) = self.db.validator().count(filter, options)?;

        let handle = self
            .db
            .acquire(self.name.as_str())
            .await
            .map_err(|e| self.failed(op, e.reason()))?;

        let counted = match pipeline::count_plan(filter) {
            CountPlan::Native(predicate) => {
                let raw = handle
                    .count(predicate, options)
                    .await
                    .map_err(|e| self.failed(op, e.reason()))?;
                normalize::native_count(&raw)
            }
            CountPlan::Aggregate(stages) => {
                let raw = handle
                    .aggregate(stages, options)
                    .await
                    .map_err(|e| self.failed(op, e.reason()))?;
                normalize::pipeline_count(&raw)
            }
        };

        match counted {
            Normalized::Success(n) => Ok(n),
            Normalized::Empty => Ok(0),
            other => Err(self.failed(op, other.describe())),
        }
    }

    /// Runs an aggregation pipeline. Any operational failure yields an empty result.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn aggregate(
        &self,
        pipeline: Bson,
        options: Option<Bson>,
    ) -> Result<Vec<BsonDocument>> {
        let op = Operation::Aggregate;
        let (stages, options) = self.db.validator().aggregate(pipeline, options)?;

        let result = self.run_aggregate(stages, options).await;
        Ok(self.or_default(op, result, Vec::new()))
    }

    async fn run_aggregate(
        &self,
        stages: Vec<BsonDocument>,
        options: Option<BsonDocument>,
    ) -> Result<Vec<BsonDocument>> {
        let handle = self.db.acquire(self.name.as_str()).await?;
        let raw = handle.aggregate(stages, options).await?;

        match normalize::documents(raw) {
            Normalized::Success(docs) => Ok(docs),
            Normalized::Empty => Ok(Vec::new()),
            other => Err(DocBridgeError::Query(other.describe().to_string())),
        }
    }

    /// Returns the first matching document.
    ///
    /// Runs `[$match?, $limit: 1, $project?]`. Acquisition and driver errors
    /// are returned; an empty or malformed result is `None`.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn find_one(
        &self,
        query: Option<Bson>,
        projection: Option<Bson>,
    ) -> Result<Option<BsonDocument>> {
        let op = Operation::FindOne;
        let (query, projection) = self.db.validator().find_one(query, projection)?;
        let stages = pipeline::find_one_pipeline(query, projection);

        let handle = self
            .db
            .acquire(self.name.as_str())
            .await
            .map_err(|e| self.failed(op, e.reason()))?;

        let raw = handle
            .aggregate(stages, None)
            .await
            .map_err(|e| self.failed(op, e.reason()))?;

        match normalize::documents(raw) {
            Normalized::Success(docs) => Ok(docs.into_iter().next()),
            Normalized::Malformed => {
                debug!(collection = %self.name, "Malformed findOne result treated as not found");
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Deletes the first matching document. Returns `false` on any operational failure.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn remove_one(&self, query: Bson, options: Option<Bson>) -> Result<bool> {
        self.remove(Operation::RemoveOne, query, options).await
    }

    /// Deletes every matching document. Returns `false` on any operational failure.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn remove_many(&self, query: Bson, options: Option<Bson>) -> Result<bool> {
        self.remove(Operation::RemoveMany, query, options).await
    }

    async fn remove(&self, op: Operation, query: Bson, options: Option<Bson>) -> Result<bool> {
        let (query, options) = self.db.validator().remove(op, query, options)?;

        let result: Result<bool> = async {
            let handle = self.db.acquire(self.name.as_str()).await?;
            let raw = match op {
                Operation::RemoveMany => handle.delete_many(query, options).await?,
                _ => handle.delete_one(query, options).await?,
            };
            acknowledged(&raw)
        }
        .await;

        Ok(self.or_default(op, result, false))
    }

    /// Updates the first matching document. Returns `false` on any operational failure.
    ///
    /// `data` is an update-operator object or an update pipeline.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn update_one(&self, query: Bson, data: Bson, options: Option<Bson>) -> Result<bool> {
        self.update(Operation::UpdateOne, query, data, options).await
    }

    /// Updates every matching document. Returns `false` on any operational failure.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn update_many(
        &self,
        query: Bson,
        data: Bson,
        options: Option<Bson>,
    ) -> Result<bool> {
        self.update(Operation::UpdateMany, query, data, options).await
    }

    async fn update(
        &self,
        op: Operation,
        query: Bson,
        data: Bson,
        options: Option<Bson>,
    ) -> Result<bool> {
        let (query, update, options) = self.db.validator().update(op, query, data, options)?;

        let result: Result<bool> = async {
            let handle = self.db.acquire(self.name.as_str()).await?;
            let raw = match op {
                Operation::UpdateMany => handle.update_many(query, update, options).await?,
                _ => handle.update_one(query, update, options).await?,
            };
            acknowledged(&raw)
        }
        .await;

        Ok(self.or_default(op, result, false))
    }

    /// Inserts one document through an unordered bulk batch.
    ///
    /// Returns `None` on any operational failure, including an inserted count
    /// other than one.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn insert_one(
        &self,
        document: Bson,
        options: Option<Bson>,
    ) -> Result<Option<BulkWriteSummary>> {
        let op = Operation::InsertOne;
        debug!(stage = %BulkStage::Validating, "Bulk stage");
        let (document, options) = self.db.validator().insert_one(document, options)?;

        let plan = BulkPlan {
            ordered: false,
            options,
            expected_inserts: Some(1),
        };
        let result = self
            .run_bulk(plan, move |writer| async move { writer.insert(document) })
            .await;

        Ok(self.or_default(op, result.map(Some), None))
    }

    /// Inserts documents through an unordered bulk batch.
    ///
    /// Succeeds only if every submitted document is reported inserted; a
    /// partial insert is a failure.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn insert_many(&self, documents: Bson, options: Option<Bson>) -> Result<bool> {
        let op = Operation::InsertMany;
        debug!(stage = %BulkStage::Validating, "Bulk stage");
        let (documents, options) = self.db.validator().insert_many(documents, options)?;

        let plan = BulkPlan {
            ordered: false,
            options,
            expected_inserts: Some(documents.len()),
        };
        let result = self
            .run_bulk(plan, move |writer| async move {
                for document in documents {
                    writer.insert(document)?;
                }
                Ok::<(), DocBridgeError>(())
            })
            .await;

        Ok(self.or_default(op, result.map(|_| true), false))
    }

    /// Builds and executes a bulk batch through an asynchronous callback.
    ///
    /// `sorted = Some(true)` uses the ordered operator (stop at first failure);
    /// otherwise the unordered one. The callback is awaited before execute.
    /// Returns `None` on any operational failure, including a callback error.
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn bulk_ops<F, Fut>(
        &self,
        build: F,
        sorted: Option<bool>,
    ) -> Result<Option<BulkWriteSummary>>
    where
        F: FnOnce(BulkWriter) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let op = Operation::BulkOps;
        let plan = BulkPlan {
            ordered: sorted.unwrap_or(false),
            options: None,
            expected_inserts: None,
        };

        let result = self.run_bulk(plan, build).await;
        Ok(self.or_default(op, result.map(Some), None))
    }

    /// Same as [`Query::bulk_ops`] with a synchronous callback
    #[instrument(skip_all, fields(collection = %self.name))]
    pub async fn bulk_ops_sync<F>(
        &self,
        build: F,
        sorted: Option<bool>,
    ) -> Result<Option<BulkWriteSummary>>
    where
        F: FnOnce(&BulkWriter) -> Result<()> + Send,
    {
        self.bulk_ops(
            move |writer| futures::future::ready(build(&writer)),
            sorted,
        )
        .await
    }

    async fn run_bulk<F, Fut>(&self, plan: BulkPlan, build: F) -> Result<BulkWriteSummary>
    where
        F: FnOnce(BulkWriter) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        debug!(stage = %BulkStage::AcquiringConnection, "Bulk stage");
        let handle = self
            .db
            .acquire(self.name.as_str())
            .await
            .map_err(|e| BulkStage::AcquiringConnection.fail(e.reason()))?;

        bulk::run(handle.as_ref(), plan, build).await
    }
}

/// Success of a delete/update requires `acknowledged: true`
fn acknowledged(raw: &Bson) -> Result<bool> {
    match normalize::write_result(raw) {
        Normalized::Success(_) => Ok(true),
        other => Err(DocBridgeError::Query(other.describe().to_string())),
    }
}

