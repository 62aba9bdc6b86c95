//! Bulk write orchestration.
//!
//! A bulk call walks a fixed sequence of stages:
//!
//! ```text
//! Validating -> AcquiringConnection -> AcquiringOperator -> ApplyingOperations
//!            -> Executing -> Normalizing -> Success | Failed
//! ```
//!
//! Any stage failure ends the call; operations already applied to the
//! operator are simply dropped with it. The caller's callback receives a
//! [`BulkWriter`] capability and is awaited to completion before `execute`.

use crate::driver::{BulkOperator, CollectionHandle};
use crate::normalize;
use crate::pipeline::UpdateSpec;
use crate::{DocBridgeError, Result};
use bson::Document as BsonDocument;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Counts reported by an executed bulk batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteSummary {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub upserted_count: u64,
}

/// Stages of a bulk call, used in failure reasons and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkStage {
    /// Input checks of insert calls; callback calls are checked by their signature
    Validating,
    AcquiringConnection,
    AcquiringOperator,
    ApplyingOperations,
    Executing,
    Normalizing,
}

impl BulkStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::AcquiringConnection => "acquiring connection",
            Self::AcquiringOperator => "acquiring operator",
            Self::ApplyingOperations => "applying operations",
            Self::Executing => "executing",
            Self::Normalizing => "normalizing",
        }
    }

    /// Wraps `err` with the stage it happened in
    pub fn fail(&self, err: impl fmt::Display) -> DocBridgeError {
        DocBridgeError::Database(format!("bulk write failed while {}: {}", self, err))
    }
}

impl fmt::Display for BulkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to the bulk operator of one in-flight bulk call
///
/// Cloning shares the same operator. Once the call moves to `Executing`
/// every clone is detached and further operations fail.
#[derive(Clone)]
pub struct BulkWriter {
    operator: Arc<Mutex<Option<Box<dyn BulkOperator>>>>,
}

impl fmt::Debug for BulkWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkWriter")
            .field("pending", &self.len())
            .field("detached", &self.operator.lock().is_none())
            .finish()
    }
}

impl BulkWriter {
    fn new(operator: Box<dyn BulkOperator>) -> Self {
        Self {
            operator: Arc::new(Mutex::new(Some(operator))),
        }
    }

    fn with_operator<R>(&self, f: impl FnOnce(&mut dyn BulkOperator) -> Result<R>) -> Result<R> {
        let mut guard = self.operator.lock();
        match guard.as_mut() {
            Some(operator) => f(operator.as_mut()),
            None => Err(DocBridgeError::Query(
                "bulk writer is no longer attached to an operator".to_string(),
            )),
        }
    }

    fn detach(&self) -> Option<Box<dyn BulkOperator>> {
        self.operator.lock().take()
    }

    pub fn insert(&self, document: BsonDocument) -> Result<()> {
        self.with_operator(|op| op.insert(document))
    }

    pub fn update_one(&self, query: BsonDocument, update: UpdateSpec, upsert: bool) -> Result<()> {
        self.with_operator(|op| op.update_one(query, update, upsert))
    }

    pub fn update_many(&self, query: BsonDocument, update: UpdateSpec, upsert: bool) -> Result<()> {
        self.with_operator(|op| op.update_many(query, update, upsert))
    }

    pub fn delete_one(&self, query: BsonDocument) -> Result<()> {
        self.with_operator(|op| op.delete_one(query))
    }

    pub fn delete_many(&self, query: BsonDocument) -> Result<()> {
        self.with_operator(|op| op.delete_many(query))
    }

    /// Number of operations applied so far (0 once detached)
    pub fn len(&self) -> usize {
        self.operator.lock().as_ref().map_or(0, |op| op.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameters of one bulk call against an already acquired handle
pub(crate) struct BulkPlan {
    pub ordered: bool,
    pub options: Option<BsonDocument>,
    /// When set, `insertedCount` must equal this value
    pub expected_inserts: Option<usize>,
}

/// Runs the operator stages of a bulk call.
///
/// The connection has already been acquired by the caller.
pub(crate) async fn run<F, Fut>(
    handle: &dyn CollectionHandle,
    plan: BulkPlan,
    build: F,
) -> Result<BulkWriteSummary>
where
    F: FnOnce(BulkWriter) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    debug!(stage = %BulkStage::AcquiringOperator, ordered = plan.ordered, "Bulk stage");
    let operator = if plan.ordered {
        handle.initialize_ordered_bulk_op(plan.options)
    } else {
        handle.initialize_unordered_bulk_op(plan.options)
    }
    .map_err(|e| BulkStage::AcquiringOperator.fail(e.reason()))?;

    debug!(stage = %BulkStage::ApplyingOperations, "Bulk stage");
    let writer = BulkWriter::new(operator);
    build(writer.clone())
        .await
        .map_err(|e| BulkStage::ApplyingOperations.fail(e.reason()))?;

    let operator = writer
        .detach()
        .ok_or_else(|| BulkStage::ApplyingOperations.fail("operator was detached early"))?;

    debug!(stage = %BulkStage::Executing, operations = operator.len(), "Bulk stage");
    let raw = operator
        .execute()
        .await
        .map_err(|e| BulkStage::Executing.fail(e.reason()))?;

    debug!(stage = %BulkStage::Normalizing, "Bulk stage");
    let normalized = match plan.expected_inserts {
        Some(expected) => normalize::bulk_insert_result(&raw, expected),
        None => normalize::bulk_result(&raw),
    };
    let reason = normalized.describe();
    normalized
        .success()
        .ok_or_else(|| BulkStage::Normalizing.fail(reason))
}
