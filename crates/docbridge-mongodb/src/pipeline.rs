//! Filter and pipeline translation
//!
//! Turns validated count/find-style inputs into the concrete driver call:
//! a native count, or an aggregation pipeline with derived stages appended.

use bson::{doc, Document as BsonDocument};

/// Name of the field produced by the terminal `$count` stage
pub const COUNT_FIELD: &str = "count";

/// Document selector: a predicate mapping or an aggregation pipeline prefix
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Predicate(BsonDocument),
    Pipeline(Vec<BsonDocument>),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Predicate(BsonDocument::new())
    }
}

/// Update operators or an update pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSpec {
    Operators(BsonDocument),
    Pipeline(Vec<BsonDocument>),
}

impl From<BsonDocument> for UpdateSpec {
    fn from(doc: BsonDocument) -> Self {
        UpdateSpec::Operators(doc)
    }
}

impl From<UpdateSpec> for mongodb::options::UpdateModifications {
    fn from(spec: UpdateSpec) -> Self {
        match spec {
            UpdateSpec::Operators(doc) => mongodb::options::UpdateModifications::Document(doc),
            UpdateSpec::Pipeline(stages) => mongodb::options::UpdateModifications::Pipeline(stages),
        }
    }
}

/// Driver call that answers a count request
#[derive(Debug, Clone, PartialEq)]
pub enum CountPlan {
    /// Native count with the predicate
    Native(BsonDocument),
    /// Aggregation ending in a `$count` stage
    Aggregate(Vec<BsonDocument>),
}

/// Chooses between a native count and a `$count` aggregation.
pub fn count_plan(filter: Filter) -> CountPlan {
    match filter {
        Filter::Predicate(predicate) => CountPlan::Native(predicate),
        Filter::Pipeline(mut stages) => {
            stages.push(doc! { "$count": COUNT_FIELD });
            CountPlan::Aggregate(stages)
        }
    }
}

/// Builds `[$match?, $limit: 1, $project?]` for a single-document lookup.
///
/// Empty query or projection documents are treated as absent.
pub fn find_one_pipeline(
    query: Option<BsonDocument>,
    projection: Option<BsonDocument>,
) -> Vec<BsonDocument> {
    let mut stages = Vec::with_capacity(3);

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        stages.push(doc! { "$match": query });
    }

    stages.push(doc! { "$limit": 1 });

    if let Some(projection) = projection.filter(|p| !p.is_empty()) {
        stages.push(doc! { "$project": projection });
    }

    stages
}
