//! Single-collection queries
//!
//! Only what the range scan needs: a collection path, an immediate-child
//! test and a field-filter predicate. Ordering, limits and cursors belong
//! to the query engine.

use super::document::Document;
use super::path::ResourcePath;
use super::value::Value;

/// Comparison applied by a [`FieldFilter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    LessThan,
    LessThanOrEqual,
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
}

/// `field op value`, where `field` is a dotted path
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, op: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.field(&self.field) else {
            return false;
        };
        match self.op {
            Operator::Equal => actual.equals(&self.value),
            Operator::ArrayContains => match actual {
                Value::ArrayValue(array) => array.values.iter().any(|v| v.equals(&self.value)),
                _ => false,
            },
            Operator::LessThan => actual.compare(&self.value).is_some_and(|o| o.is_lt()),
            Operator::LessThanOrEqual => actual.compare(&self.value).is_some_and(|o| o.is_le()),
            Operator::GreaterThan => actual.compare(&self.value).is_some_and(|o| o.is_gt()),
            Operator::GreaterThanOrEqual => {
                actual.compare(&self.value).is_some_and(|o| o.is_ge())
            }
        }
    }
}

/// A query over the documents of one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    path: ResourcePath,
    collection_group: Option<String>,
    filters: Vec<FieldFilter>,
}

impl Query {
    /// Query the collection at `path`
    pub fn at_path(path: ResourcePath) -> Self {
        Self {
            path,
            collection_group: None,
            filters: Vec::new(),
        }
    }

    /// Query every collection named `collection_id`, at any depth
    pub fn collection_group(collection_id: impl Into<String>) -> Self {
        Self {
            path: ResourcePath::empty(),
            collection_group: Some(collection_id.into()),
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn is_collection_group_query(&self) -> bool {
        self.collection_group.is_some()
    }

    pub fn collection_group_id(&self) -> Option<&str> {
        self.collection_group.as_deref()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.matches_path(doc) && self.filters.iter().all(|f| f.matches(doc))
    }

    fn matches_path(&self, doc: &Document) -> bool {
        let doc_path = doc.key().path();
        match &self.collection_group {
            Some(id) => doc.key().collection_id() == id && self.path.is_prefix_of(doc_path),
            None => self.path.is_immediate_parent_of(doc_path),
        }
    }
}
