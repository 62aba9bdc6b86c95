//! Input validation for query operations
//!
//! Every public operation checks the shape of its loosely-typed arguments here
//! before any connection is requested. Failures are reported as
//! `DocBridgeError::Validation("<Operation>: <constraint>")`.
//!
//! # Security Features
//! - Collection name validation (prevents system collection access)
//! - Rejection of server-side JavaScript operators in filters and pipelines

use crate::pipeline::{Filter, UpdateSpec};
use crate::Result;
use bson::{Bson, Document as BsonDocument};
use docbridge_common::DocBridgeError;
use std::fmt;
use tracing::warn;

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Operators that execute JavaScript on the server
const DANGEROUS_OPERATORS: &[&str] = &["$where", "$function", "$accumulator"];

/// Public operation names used as the prefix of every error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Count,
    Aggregate,
    FindOne,
    RemoveOne,
    RemoveMany,
    UpdateOne,
    UpdateMany,
    InsertOne,
    InsertMany,
    BulkOps,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "Query",
            Self::Count => "Count",
            Self::Aggregate => "Aggregate",
            Self::FindOne => "FindOne",
            Self::RemoveOne => "RemoveOne",
            Self::RemoveMany => "RemoveMany",
            Self::UpdateOne => "UpdateOne",
            Self::UpdateMany => "UpdateMany",
            Self::InsertOne => "InsertOne",
            Self::InsertMany => "InsertMany",
            Self::BulkOps => "BulkOps",
        }
    }

    /// Builds the input error for this operation
    pub fn invalid(&self, constraint: impl fmt::Display) -> DocBridgeError {
        DocBridgeError::Validation(format!("{}: {}", self.as_str(), constraint))
    }

    /// Builds the wrapped operational error for this operation
    pub fn failed(&self, reason: impl fmt::Display) -> DocBridgeError {
        DocBridgeError::Operation(format!("{}: Failed - {}", self.as_str(), reason))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated collection name
///
/// # Security Guarantees
/// - Not empty
/// - Maximum 120 characters
/// - No null bytes
/// - No "system." prefix (system collections)
/// - No $ characters (special operators)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCollectionName {
    name: String,
}

impl ValidatedCollectionName {
    /// Creates a new validated collection name
    ///
    /// # Errors
    /// Returns a validation error prefixed with `Query:` if the name is empty,
    /// too long, contains a null byte or `$`, or starts with `system.`.
    pub fn new(name: &str) -> Result<Self> {
        let op = Operation::Query;

        if name.is_empty() {
            return Err(op.invalid("Collection name cannot be empty"));
        }

        if name.len() > MAX_COLLECTION_NAME_LENGTH {
            return Err(op.invalid(format!(
                "Collection name exceeds maximum length of {} characters: '{}'",
                MAX_COLLECTION_NAME_LENGTH, name
            )));
        }

        if name.contains('\0') {
            return Err(op.invalid("Collection name cannot contain null bytes"));
        }

        if name.starts_with("system.") {
            return Err(op.invalid(format!(
                "Collection name cannot start with 'system.' (reserved): '{}'",
                name
            )));
        }

        if name.contains('$') {
            return Err(op.invalid(format!(
                "Collection name cannot contain '$' character: '{}'",
                name
            )));
        }

        if name.contains("..") || name.contains("//") {
            warn!(collection = name, "Collection name contains suspicious pattern");
        }

        Ok(ValidatedCollectionName {
            name: name.to_string(),
        })
    }

    /// Returns the validated collection name as a string slice
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Consumes the ValidatedCollectionName and returns the inner String
    pub fn into_string(self) -> String {
        self.name
    }
}

impl AsRef<str> for ValidatedCollectionName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ValidatedCollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Finds the first server-side JavaScript operator anywhere in `value`
pub fn find_dangerous_operator(value: &Bson) -> Option<&'static str> {
    match value {
        Bson::Document(doc) => doc.iter().find_map(|(key, nested)| {
            DANGEROUS_OPERATORS
                .iter()
                .find(|op| **op == key.as_str())
                .copied()
                .or_else(|| find_dangerous_operator(nested))
        }),
        Bson::Array(items) => items.iter().find_map(find_dangerous_operator),
        _ => None,
    }
}

fn is_absent(value: &Option<Bson>) -> bool {
    matches!(value, None | Some(Bson::Null))
}

/// Keeps the non-empty stage objects of a pipeline
fn sanitize_stages(items: Vec<Bson>) -> Vec<BsonDocument> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Bson::Document(stage) if !stage.is_empty() => Some(stage),
            _ => None,
        })
        .collect()
}

/// Keeps the object entries of a document list
fn sanitize_documents(items: Vec<Bson>) -> Vec<BsonDocument> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Bson::Document(doc) => Some(doc),
            _ => None,
        })
        .collect()
}

/// Per-operation argument checks
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    validate_queries: bool,
}

impl Validator {
    /// `validate_queries` enables rejection of JavaScript operators
    pub fn new(validate_queries: bool) -> Self {
        Self { validate_queries }
    }

    fn guard<'a>(
        &self,
        op: Operation,
        docs: impl IntoIterator<Item = &'a BsonDocument>,
    ) -> Result<()> {
        if !self.validate_queries {
            return Ok(());
        }
        for doc in docs {
            if let Some(found) = find_dangerous_operator(&Bson::Document(doc.clone())) {
                return Err(op.invalid(format!(
                    "Dangerous operator '{}' is not allowed for security reasons",
                    found
                )));
            }
        }
        Ok(())
    }

    /// Options must be an object or absent
    pub fn options(&self, op: Operation, options: Option<Bson>) -> Result<Option<BsonDocument>> {
        match options {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::Document(doc)) => Ok(Some(doc)),
            Some(_) => Err(op.invalid("options must be an object")),
        }
    }

    fn required_query(&self, op: Operation, query: Bson) -> Result<BsonDocument> {
        match query {
            Bson::Document(doc) if !doc.is_empty() => {
                self.guard(op, [&doc])?;
                Ok(doc)
            }
            _ => Err(op.invalid("query must be a non-empty object")),
        }
    }

    fn optional_object(
        &self,
        op: Operation,
        what: &str,
        value: Option<Bson>,
    ) -> Result<Option<BsonDocument>> {
        if is_absent(&value) {
            return Ok(None);
        }
        match value {
            Some(Bson::Document(doc)) => Ok(Some(doc)),
            _ => Err(op.invalid(format!("{} must be an object", what))),
        }
    }

    /// `count(filter?, options?)`
    pub fn count(
        &self,
        filter: Option<Bson>,
        options: Option<Bson>,
    ) -> Result<(Filter, Option<BsonDocument>)> {
        let op = Operation::Count;
        let options = self.options(op, options)?;

        let filter = match filter {
            None | Some(Bson::Null) => Filter::default(),
            Some(Bson::Document(predicate)) => {
                self.guard(op, [&predicate])?;
                Filter::Predicate(predicate)
            }
            Some(Bson::Array(items)) => {
                if items.is_empty() {
                    return Err(op.invalid("filter must be an object or a non-empty array"));
                }
                let stages = sanitize_stages(items);
                if stages.is_empty() {
                    return Err(op.invalid("filter pipeline must contain at least one non-empty stage"));
                }
                self.guard(op, &stages)?;
                Filter::Pipeline(stages)
            }
            Some(_) => return Err(op.invalid("filter must be an object or a non-empty array")),
        };

        Ok((filter, options))
    }

    /// `aggregate(pipeline, options?)`
    pub fn aggregate(
        &self,
        pipeline: Bson,
        options: Option<Bson>,
    ) -> Result<(Vec<BsonDocument>, Option<BsonDocument>)> {
        let op = Operation::Aggregate;

        let stages = match pipeline {
            Bson::Array(items) if !items.is_empty() => sanitize_stages(items),
            _ => return Err(op.invalid("pipeline must be a non-empty array")),
        };
        if stages.is_empty() {
            return Err(op.invalid("pipeline must contain at least one non-empty stage"));
        }
        self.guard(op, &stages)?;

        let options = self.options(op, options)?;
        Ok((stages, options))
    }

    /// `find_one(query?, projection?)`
    pub fn find_one(
        &self,
        query: Option<Bson>,
        projection: Option<Bson>,
    ) -> Result<(Option<BsonDocument>, Option<BsonDocument>)> {
        let op = Operation::FindOne;
        let query = self.optional_object(op, "query", query)?;
        let projection = self.optional_object(op, "projection", projection)?;
        self.guard(op, query.iter().chain(projection.iter()))?;
        Ok((query, projection))
    }

    /// `remove_one/remove_many(query, options?)`
    pub fn remove(
        &self,
        op: Operation,
        query: Bson,
        options: Option<Bson>,
    ) -> Result<(BsonDocument, Option<BsonDocument>)> {
        let query = self.required_query(op, query)?;
        let options = self.options(op, options)?;
        Ok((query, options))
    }

    /// `update_one/update_many(query, data, options?)`
    pub fn update(
        &self,
        op: Operation,
        query: Bson,
        data: Bson,
        options: Option<Bson>,
    ) -> Result<(BsonDocument, UpdateSpec, Option<BsonDocument>)> {
        let query = self.required_query(op, query)?;

        let update = match data {
            Bson::Document(doc) if !doc.is_empty() => UpdateSpec::Operators(doc),
            Bson::Array(items) if !items.is_empty() => {
                let mut stages = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Bson::Document(stage) if !stage.is_empty() => stages.push(stage),
                        _ => {
                            return Err(op.invalid(
                                "data pipeline must contain only non-empty stage objects",
                            ))
                        }
                    }
                }
                UpdateSpec::Pipeline(stages)
            }
            _ => {
                return Err(op.invalid(
                    "data must be a non-empty object or a non-empty array of stages",
                ))
            }
        };
        match &update {
            UpdateSpec::Operators(doc) => self.guard(op, [doc])?,
            UpdateSpec::Pipeline(stages) => self.guard(op, stages)?,
        }

        let options = self.options(op, options)?;
        Ok((query, update, options))
    }

    /// `insert_one(document, options?)`
    pub fn insert_one(
        &self,
        document: Bson,
        options: Option<Bson>,
    ) -> Result<(BsonDocument, Option<BsonDocument>)> {
        let op = Operation::InsertOne;
        let document = match document {
            Bson::Document(doc) if !doc.is_empty() => doc,
            _ => return Err(op.invalid("document must be a non-empty object")),
        };
        let options = self.options(op, options)?;
        Ok((document, options))
    }

    /// `insert_many(documents, options?)`
    pub fn insert_many(
        &self,
        documents: Bson,
        options: Option<Bson>,
    ) -> Result<(Vec<BsonDocument>, Option<BsonDocument>)> {
        let op = Operation::InsertMany;
        let documents = match documents {
            Bson::Array(items) if !items.is_empty() => sanitize_documents(items),
            _ => return Err(op.invalid("documents must be a non-empty array")),
        };
        if documents.is_empty() {
            return Err(op.invalid("documents must contain at least one object"));
        }
        let options = self.options(op, options)?;
        Ok((documents, options))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(true)
    }
}
