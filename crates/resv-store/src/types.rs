use std::cmp::Ordering;
use std::fmt;

use resv_schemas::{lenient, Fields};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A stored document: an id plus its top-level field map.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The `revision` field, `0` when absent.
    pub fn revision(&self) -> u64 {
        self.fields
            .get(resv_schemas::field::REVISION)
            .map(lenient::amount_from_value)
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Equality filter on a top-level field.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filters are AND-ed. Ordering keys apply in sequence; the document id
/// (ascending) is always the final tie-break.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|f| doc.fields.get(&f.field) == Some(&f.value))
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.order {
            let ord = compare_values(a.get(&key.field), b.get(&key.field));
            let ord = match key.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    }

    /// Filter and order `docs` in place.
    pub fn apply(&self, docs: &mut Vec<Document>) {
        docs.retain(|d| self.matches(d));
        docs.sort_by(|a, b| self.compare(a, b));
    }
}

/// Total order over optional JSON values:
/// missing/null < bool < number < string < array < object.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Create; fails with [`StoreError::AlreadyExists`] if the id is taken.
    Insert,
    /// Shallow-merge top-level fields, creating the document if absent.
    Merge,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Put {
        collection: String,
        id: String,
        fields: Fields,
        mode: WriteMode,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Put { collection, .. } | WriteOp::Delete { collection, .. } => collection,
        }
    }
}

/// Optimistic-concurrency guard checked before a batch is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Precondition {
    pub collection: String,
    pub id: String,
    /// `None`: the document must not exist.
    /// `Some(r)`: the document must exist with `revision == r`.
    pub expected_revision: Option<u64>,
}

/// Puts and deletes applied all-or-nothing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    pub preconditions: Vec<Precondition>,
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_revision(
        mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        expected_revision: Option<u64>,
    ) -> Self {
        self.preconditions.push(Precondition {
            collection: collection.into(),
            id: id.into(),
            expected_revision,
        });
        self
    }

    pub fn put(
        mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Fields,
        mode: WriteMode,
    ) -> Self {
        self.ops.push(WriteOp::Put {
            collection: collection.into(),
            id: id.into(),
            fields,
            mode,
        });
        self
    }

    pub fn delete(mut self, collection: impl Into<String>, id: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct collections touched by the batch, in first-seen order.
    pub fn collections(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for op in &self.ops {
            if !out.iter().any(|c| c == op.collection()) {
                out.push(op.collection().to_string());
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// "Collection changed" signal. Subscribers re-query; no delta is carried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeNotice {
    pub collection: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transport, permission or backend failure. Retryable by the caller.
    Unavailable(String),
    /// Insert collided with an existing document.
    AlreadyExists { collection: String, id: String },
    /// A batch precondition did not hold; nothing was written.
    PreconditionFailed { collection: String, id: String },
}

impl StoreError {
    /// Optimistic-concurrency conflicts (the caller may re-read and retry).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists { .. } | StoreError::PreconditionFailed { .. }
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            Self::AlreadyExists { collection, id } => {
                write!(f, "document {collection}/{id} already exists")
            }
            Self::PreconditionFailed { collection, id } => {
                write!(f, "precondition failed on {collection}/{id}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
