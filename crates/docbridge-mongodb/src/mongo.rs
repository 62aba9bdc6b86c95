//! MongoDB driver adapter
//!
//! Implements the handle traits on top of the official driver. Clients are
//! cached per URI for the life of the connector and shut down by `close`.

use crate::bulk::BulkWriteSummary;
use crate::config::PoolConfig;
use crate::driver::{BulkOperator, ClientHandle, CollectionHandle, ConnectionManager, DbHandle};
use crate::pipeline::UpdateSpec;
use crate::{DocBridgeError, Result};
use async_trait::async_trait;
use bson::{doc, Bson, Document as BsonDocument};
use futures::TryStreamExt;
use mongodb::{
    options::{
        AggregateOptions, ClientOptions, CountOptions, DatabaseOptions, DeleteOptions,
        InsertManyOptions, ServerApi, ServerApiVersion, UpdateOptions, WriteConcern,
    },
    results::UpdateResult,
    Client, Collection,
};
use serde::de::DeserializeOwned;
use std::collections::{hash_map::Entry, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Connection manager backed by the MongoDB driver
pub struct MongoConnector {
    pool: PoolConfig,
    clients: Mutex<HashMap<String, Client>>,
}

impl MongoConnector {
    pub fn new(pool: PoolConfig) -> Self {
        Self {
            pool,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached clients
    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    async fn build_client(&self, uri: &str, options: &BsonDocument) -> Result<Client> {
        let mut client_options = ClientOptions::parse(uri).await?;
        apply_pool(&mut client_options, self.pool.merge_document(options));

        // Set stable API version for compatibility
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        Ok(Client::with_options(client_options)?)
    }
}

fn apply_pool(client_options: &mut ClientOptions, config: PoolConfig) {
    if let Some(min) = config.min_pool_size {
        client_options.min_pool_size = Some(min);
    }
    if let Some(max) = config.max_pool_size {
        client_options.max_pool_size = Some(max);
    }
    if let Some(idle) = config.max_idle_time {
        client_options.max_idle_time = Some(idle);
    }
    if let Some(connect) = config.connect_timeout {
        client_options.connect_timeout = Some(connect);
    }
    if let Some(server_sel) = config.server_selection_timeout {
        client_options.server_selection_timeout = Some(server_sel);
    }
    if let Some(app) = config.app_name {
        client_options.app_name = Some(app);
    }
}

#[async_trait]
impl ConnectionManager for MongoConnector {
    async fn connect(&self, uri: &str, options: &BsonDocument) -> Result<Arc<dyn ClientHandle>> {
        if let Some(client) = self.clients.lock().await.get(uri) {
            return Ok(Arc::new(MongoClientHandle {
                client: client.clone(),
            }));
        }

        // Built without the lock held; the first client cached for a URI wins.
        let built = self.build_client(uri, options).await?;

        let mut clients = self.clients.lock().await;
        let (client, duplicate) = match clients.entry(uri.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), Some(built)),
            Entry::Vacant(entry) => (entry.insert(built).clone(), None),
        };
        info!(cached = clients.len(), "MongoDB client ready");
        drop(clients);

        if let Some(duplicate) = duplicate {
            debug!("MongoDB client cached concurrently, discarding duplicate");
            duplicate.shutdown().await;
        }

        Ok(Arc::new(MongoClientHandle { client }))
    }

    async fn close(&self) -> Result<()> {
        let drained: Vec<Client> = self.clients.lock().await.drain().map(|(_, c)| c).collect();
        let count = drained.len();

        for client in drained {
            client.shutdown().await;
        }

        info!(count, "MongoDB clients closed");
        Ok(())
    }
}

struct MongoClientHandle {
    client: Client,
}

impl ClientHandle for MongoClientHandle {
    fn db(&self, name: &str, options: &BsonDocument) -> Result<Arc<dyn DbHandle>> {
        if name.is_empty() {
            return Err(DocBridgeError::Connection(
                "Database name cannot be empty".to_string(),
            ));
        }

        let database = if options.is_empty() {
            self.client.database(name)
        } else {
            let options: DatabaseOptions = bson::from_document(options.clone())?;
            self.client.database_with_options(name, options)
        };

        Ok(Arc::new(MongoDbHandle { database }))
    }
}

struct MongoDbHandle {
    database: mongodb::Database,
}

impl DbHandle for MongoDbHandle {
    fn collection(&self, name: &str) -> Result<Arc<dyn CollectionHandle>> {
        Ok(Arc::new(MongoCollectionHandle {
            collection: self.database.collection::<BsonDocument>(name),
        }))
    }
}

/// Decodes a driver options struct from a loosely typed document
fn parse_options<T: DeserializeOwned>(options: Option<BsonDocument>) -> Result<Option<T>> {
    Ok(options.map(bson::from_document).transpose()?)
}

fn count_bson(n: u64) -> Bson {
    Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX))
}

fn update_result(result: UpdateResult) -> Bson {
    Bson::Document(doc! {
        "acknowledged": true,
        "matchedCount": count_bson(result.matched_count),
        "modifiedCount": count_bson(result.modified_count),
        "upsertedCount": if result.upserted_id.is_some() { 1_i64 } else { 0_i64 },
    })
}

struct MongoCollectionHandle {
    collection: Collection<BsonDocument>,
}

impl MongoCollectionHandle {
    fn bulk_operator(
        &self,
        ordered: bool,
        options: Option<BsonDocument>,
    ) -> Result<Box<dyn BulkOperator>> {
        let options = options.unwrap_or_default();
        let write_concern = match options.get_document("writeConcern") {
            Ok(wc) => Some(bson::from_document::<WriteConcern>(wc.clone())?),
            Err(_) => None,
        };

        Ok(Box::new(MongoBulkOperator {
            collection: self.collection.clone(),
            ordered,
            options,
            write_concern,
            ops: Vec::new(),
        }))
    }
}

#[async_trait]
impl CollectionHandle for MongoCollectionHandle {
    async fn count(&self, filter: BsonDocument, options: Option<BsonDocument>) -> Result<Bson> {
        let options: Option<CountOptions> = parse_options(options)?;
        let n = self
            .collection
            .count_documents(filter)
            .with_options(options)
            .await?;
        Ok(count_bson(n))
    }

    async fn aggregate(
        &self,
        pipeline: Vec<BsonDocument>,
        options: Option<BsonDocument>,
    ) -> Result<Bson> {
        let options: Option<AggregateOptions> = parse_options(options)?;
        let cursor = self
            .collection
            .aggregate(pipeline)
            .with_options(options)
            .await?;
        let docs: Vec<BsonDocument> = cursor.try_collect().await?;
        Ok(Bson::Array(docs.into_iter().map(Bson::Document).collect()))
    }

    async fn delete_one(
        &self,
        query: BsonDocument,
        options: Option<BsonDocument>,
    ) -> Result<Bson> {
        let options: Option<DeleteOptions> = parse_options(options)?;
        let result = self
            .collection
            .delete_one(query)
            .with_options(options)
            .await?;
        Ok(Bson::Document(doc! {
            "acknowledged": true,
            "deletedCount": count_bson(result.deleted_count),
        }))
    }

    async fn delete_many(
        &self,
        query: BsonDocument,
        options: Option<BsonDocument>,
    ) -> Result<Bson> {
        let options: Option<DeleteOptions> = parse_options(options)?;
        let result = self
            .collection
            .delete_many(query)
            .with_options(options)
            .await?;
        Ok(Bson::Document(doc! {
            "acknowledged": true,
            "deletedCount": count_bson(result.deleted_count),
        }))
    }

    async fn update_one(
        &self,
        query: BsonDocument,
        update: UpdateSpec,
        options: Option<BsonDocument>,
    ) -> Result<Bson> {
        let options: Option<UpdateOptions> = parse_options(options)?;
        let result = self
            .collection
            .update_one(query, update)
            .with_options(options)
            .await?;
        Ok(update_result(result))
    }

    async fn update_many(
        &self,
        query: BsonDocument,
        update: UpdateSpec,
        options: Option<BsonDocument>,
    ) -> Result<Bson> {
        let options: Option<UpdateOptions> = parse_options(options)?;
        let result = self
            .collection
            .update_many(query, update)
            .with_options(options)
            .await?;
        Ok(update_result(result))
    }

    fn initialize_ordered_bulk_op(
        &self,
        options: Option<BsonDocument>,
    ) -> Result<Box<dyn BulkOperator>> {
        self.bulk_operator(true, options)
    }

    fn initialize_unordered_bulk_op(
        &self,
        options: Option<BsonDocument>,
    ) -> Result<Box<dyn BulkOperator>> {
        self.bulk_operator(false, options)
    }
}

/// Queued operation that is not an insert
#[derive(Debug, Clone, PartialEq)]
enum WriteOp {
    UpdateOne {
        query: BsonDocument,
        update: UpdateSpec,
        upsert: bool,
    },
    UpdateMany {
        query: BsonDocument,
        update: UpdateSpec,
        upsert: bool,
    },
    DeleteOne(BsonDocument),
    DeleteMany(BsonDocument),
}

#[derive(Debug, Clone, PartialEq)]
enum BulkOp {
    Insert(BsonDocument),
    Write(WriteOp),
}

/// Unit of work sent to the server: a run of inserts or one other operation
#[derive(Debug, PartialEq)]
enum Batch {
    Inserts(Vec<BsonDocument>),
    Write(WriteOp),
}

/// Groups consecutive inserts so each run becomes one `insertMany`
fn into_batches(ops: Vec<BulkOp>) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();

    for op in ops {
        match op {
            BulkOp::Insert(document) => match batches.last_mut() {
                Some(Batch::Inserts(run)) => run.push(document),
                _ => batches.push(Batch::Inserts(vec![document])),
            },
            BulkOp::Write(op) => batches.push(Batch::Write(op)),
        }
    }

    batches
}

struct MongoBulkOperator {
    collection: Collection<BsonDocument>,
    ordered: bool,
    options: BsonDocument,
    write_concern: Option<WriteConcern>,
    ops: Vec<BulkOp>,
}

impl MongoBulkOperator {
    async fn apply(&self, batch: Batch, summary: &mut BulkWriteSummary) -> Result<()> {
        match batch {
            Batch::Inserts(documents) => {
                let mut options: InsertManyOptions = bson::from_document(self.options.clone())?;
                options.ordered = Some(self.ordered);
                let result = self
                    .collection
                    .insert_many(documents)
                    .with_options(options)
                    .await?;
                summary.inserted_count += result.inserted_ids.len() as u64;
            }
            Batch::Write(WriteOp::UpdateOne {
                query,
                update,
                upsert,
            }) => {
                let result = self
                    .collection
                    .update_one(query, update)
                    .with_options(self.update_options(upsert))
                    .await?;
                add_update(summary, &result);
            }
            Batch::Write(WriteOp::UpdateMany {
                query,
                update,
                upsert,
            }) => {
                let result = self
                    .collection
                    .update_many(query, update)
                    .with_options(self.update_options(upsert))
                    .await?;
                add_update(summary, &result);
            }
            Batch::Write(WriteOp::DeleteOne(query)) => {
                let result = self
                    .collection
                    .delete_one(query)
                    .with_options(self.delete_options())
                    .await?;
                summary.deleted_count += result.deleted_count;
            }
            Batch::Write(WriteOp::DeleteMany(query)) => {
                let result = self
                    .collection
                    .delete_many(query)
                    .with_options(self.delete_options())
                    .await?;
                summary.deleted_count += result.deleted_count;
            }
        }
        Ok(())
    }

    fn update_options(&self, upsert: bool) -> UpdateOptions {
        let mut options = UpdateOptions::default();
        options.upsert = Some(upsert);
        options.write_concern = self.write_concern.clone();
        options
    }

    fn delete_options(&self) -> DeleteOptions {
        let mut options = DeleteOptions::default();
        options.write_concern = self.write_concern.clone();
        options
    }
}

fn add_update(summary: &mut BulkWriteSummary, result: &UpdateResult) {
    summary.matched_count += result.matched_count;
    summary.modified_count += result.modified_count;
    if result.upserted_id.is_some() {
        summary.upserted_count += 1;
    }
}

#[async_trait]
impl BulkOperator for MongoBulkOperator {
    fn insert(&mut self, document: BsonDocument) -> Result<()> {
        self.ops.push(BulkOp::Insert(document));
        Ok(())
    }

    fn update_one(&mut self, query: BsonDocument, update: UpdateSpec, upsert: bool) -> Result<()> {
        self.ops.push(BulkOp::Write(WriteOp::UpdateOne {
            query,
            update,
            upsert,
        }));
        Ok(())
    }

    fn update_many(&mut self, query: BsonDocument, update: UpdateSpec, upsert: bool) -> Result<()> {
        self.ops.push(BulkOp::Write(WriteOp::UpdateMany {
            query,
            update,
            upsert,
        }));
        Ok(())
    }

    fn delete_one(&mut self, query: BsonDocument) -> Result<()> {
        self.ops.push(BulkOp::Write(WriteOp::DeleteOne(query)));
        Ok(())
    }

    fn delete_many(&mut self, query: BsonDocument) -> Result<()> {
        self.ops.push(BulkOp::Write(WriteOp::DeleteMany(query)));
        Ok(())
    }

    fn len(&self) -> usize {
        self.ops.len()
    }

    async fn execute(mut self: Box<Self>) -> Result<Bson> {
        if self.ops.is_empty() {
            return Err(DocBridgeError::Query(
                "Invalid BulkOperation, Batch cannot be empty".to_string(),
            ));
        }

        let batches = into_batches(std::mem::take(&mut self.ops));
        let total = batches.len();
        let mut summary = BulkWriteSummary::default();
        let mut failures: Vec<String> = Vec::new();

        for batch in batches {
            if let Err(e) = self.apply(batch, &mut summary).await {
                if self.ordered {
                    return Err(e);
                }
                warn!(error = %e, "Unordered bulk batch failed, continuing");
                failures.push(e.to_string());
            }
        }

        if !failures.is_empty() {
            return Err(DocBridgeError::Database(format!(
                "{} of {} bulk batches failed: {}",
                failures.len(),
                total,
                failures.join("; ")
            )));
        }

        debug!(batches = total, inserted = summary.inserted_count, "Bulk batch executed");

        let mut result = bson::to_document(&summary)?;
        result.insert("acknowledged", true);
        Ok(Bson::Document(result))
    }
}
