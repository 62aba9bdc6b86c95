//! Classification of raw driver results
//!
//! Driver responses arrive as untyped BSON. Each operation family has an
//! expected shape; anything else is reported as `Malformed` (or
//! `Unacknowledged` for writes) instead of leaking the raw value.

use crate::bulk::BulkWriteSummary;
use crate::pipeline::COUNT_FIELD;
use bson::{Bson, Document as BsonDocument};

/// Outcome of checking a raw result against its expected shape
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized<T> {
    Success(T),
    Empty,
    Unacknowledged,
    Malformed,
}

impl<T> Normalized<T> {
    /// Returns the payload of a `Success`
    pub fn success(self) -> Option<T> {
        match self {
            Normalized::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Normalized::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Normalized<U> {
        match self {
            Normalized::Success(value) => Normalized::Success(f(value)),
            Normalized::Empty => Normalized::Empty,
            Normalized::Unacknowledged => Normalized::Unacknowledged,
            Normalized::Malformed => Normalized::Malformed,
        }
    }

    /// Short description used as a failure reason
    pub fn describe(&self) -> &'static str {
        match self {
            Normalized::Success(_) => "success",
            Normalized::Empty => "empty result",
            Normalized::Unacknowledged => "write was not acknowledged",
            Normalized::Malformed => "malformed result",
        }
    }
}

/// Documented fields of an acknowledged delete or update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteAck {
    pub deleted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
}

fn non_negative(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        Bson::Double(f) if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
        _ => None,
    }
}

fn count_field(doc: &BsonDocument, key: &str) -> u64 {
    doc.get(key).and_then(non_negative).unwrap_or(0)
}

/// Native count: a non-negative integer
pub fn native_count(raw: &Bson) -> Normalized<u64> {
    match non_negative(raw) {
        Some(n) => Normalized::Success(n),
        None => Normalized::Malformed,
    }
}

/// `$count` aggregation: `[]` or `[{ count: n }]`
pub fn pipeline_count(raw: &Bson) -> Normalized<u64> {
    match raw {
        Bson::Array(items) if items.is_empty() => Normalized::Empty,
        Bson::Array(items) if items.len() == 1 => match &items[0] {
            Bson::Document(doc) => match doc.get(COUNT_FIELD).and_then(non_negative) {
                Some(n) => Normalized::Success(n),
                None => Normalized::Malformed,
            },
            _ => Normalized::Malformed,
        },
        _ => Normalized::Malformed,
    }
}

/// Aggregation output: an array of documents
pub fn documents(raw: Bson) -> Normalized<Vec<BsonDocument>> {
    match raw {
        Bson::Array(items) if items.is_empty() => Normalized::Empty,
        Bson::Array(items) => {
            let mut docs = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Bson::Document(doc) => docs.push(doc),
                    _ => return Normalized::Malformed,
                }
            }
            Normalized::Success(docs)
        }
        _ => Normalized::Malformed,
    }
}

/// Delete/update result: an object with `acknowledged: true`
pub fn write_result(raw: &Bson) -> Normalized<WriteAck> {
    let doc = match raw {
        Bson::Document(doc) => doc,
        _ => return Normalized::Malformed,
    };

    match doc.get("acknowledged") {
        Some(Bson::Boolean(true)) => Normalized::Success(WriteAck {
            deleted_count: count_field(doc, "deletedCount"),
            matched_count: count_field(doc, "matchedCount"),
            modified_count: count_field(doc, "modifiedCount"),
            upserted_count: count_field(doc, "upsertedCount"),
        }),
        _ => Normalized::Unacknowledged,
    }
}

/// Bulk execute result: an object carrying the batch counts
pub fn bulk_result(raw: &Bson) -> Normalized<BulkWriteSummary> {
    let doc = match raw {
        Bson::Document(doc) => doc,
        _ => return Normalized::Malformed,
    };

    if matches!(doc.get("acknowledged"), Some(Bson::Boolean(false))) {
        return Normalized::Unacknowledged;
    }

    Normalized::Success(BulkWriteSummary {
        inserted_count: count_field(doc, "insertedCount"),
        matched_count: count_field(doc, "matchedCount"),
        modified_count: count_field(doc, "modifiedCount"),
        deleted_count: count_field(doc, "deletedCount"),
        upserted_count: count_field(doc, "upsertedCount"),
    })
}

/// Bulk insert result: `insertedCount` must equal the submitted count
pub fn bulk_insert_result(raw: &Bson, expected: usize) -> Normalized<BulkWriteSummary> {
    match bulk_result(raw) {
        Normalized::Success(summary) if summary.inserted_count == expected as u64 => {
            Normalized::Success(summary)
        }
        Normalized::Success(_) => Normalized::Malformed,
        other => other,
    }
}
