//! MongoDB query layer for docbridge
//!
//! This crate provides a validated, normalized operation surface over a
//! per-collection handle supplied by a connection manager.
//!
//! # Features
//! - Synchronous-style input validation before any network call
//! - Native count or `$count` pipeline depending on filter shape
//! - Tagged classification of raw driver results
//! - Ordered/unordered bulk batches built through a callback
//! - Fixed per-method failure policy (wrapped error or sentinel)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bson::{doc, Bson};
//! use docbridge_mongodb::{Database, DatabaseConfig, Query};
//!
//! let db = Arc::new(Database::mongodb(DatabaseConfig::new("mongodb://localhost:27017", "app")));
//! let users = Query::new(db.clone(), "users")?;
//!
//! let active = users.count(Some(doc! { "active": true }.into()), None).await?;
//! let inserted = users.insert_many(Bson::Array(vec![doc! { "name": "a" }.into()]), None).await?;
//! db.close().await?;
//! ```

pub mod bulk;
pub mod config;
pub mod connection;
pub mod driver;
pub mod mongo;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod sanitize;
pub mod validation;

pub use bulk::{BulkStage, BulkWriteSummary, BulkWriter};
pub use config::{DatabaseConfig, PoolConfig};
pub use connection::Database;
pub use docbridge_common::{DocBridgeError, Result};
pub use driver::{BulkOperator, ClientHandle, CollectionHandle, ConnectionManager, DbHandle};
pub use mongo::MongoConnector;
pub use normalize::{Normalized, WriteAck};
pub use pipeline::{Filter, UpdateSpec};
pub use query::Query;
pub use validation::{Operation, ValidatedCollectionName};
