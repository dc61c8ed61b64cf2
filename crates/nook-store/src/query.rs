use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// A document as returned by the store: its identity plus its fields.
#[derive(Clone, Debug, PartialEq, Eq)]
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
}

/// A filter clause on a single top-level field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Field equals the value.
    Eq { field: String, value: Value },
    /// Field equals one of the values.
    In { field: String, values: Vec<Value> },
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::In { field, .. } => field,
        }
    }

    /// Evaluate the clause against a document. Missing fields never match.
    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = fields.get(self.field()) else {
            return false;
        };
        match self {
            Self::Eq { value, .. } => actual == value,
            Self::In { values, .. } => values.contains(actual),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Sort clause of a query.
///
/// Documents whose order field compares equal are ordered by document id in
/// the same direction, so every backend returns a deterministic sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// Opaque continuation token for resuming a query after its last document.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreCursor(String);

impl StoreCursor {
    /// Wrap a token previously produced by a backend.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoreCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(12).collect();
        write!(f, "StoreCursor({short}..)")
    }
}

/// One page of query results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryPage {
    pub documents: Vec<Document>,
    /// Present when the page was full; resuming from it may still yield an
    /// empty page.
    pub cursor: Option<StoreCursor>,
}

impl QueryPage {
    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            cursor: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
