//! Store-independent query and write descriptions.
//!
//! Filters address document fields by path (`["schedule", "status"]`). The
//! in-memory store evaluates them directly through [`Filter::matches`]; the
//! Postgres store translates them to JSONB predicates.
use anchor_graph_shared::ObjectId;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Matches documents whose `_id` is one of the ids.
    Ids(Vec<ObjectId>),
    /// Field at `path` equals `value`.
    Eq { path: Vec<String>, value: Value },
    /// String field at `path` sorts at or before `value`.
    Lte { path: Vec<String>, value: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn ids(ids: impl IntoIterator<Item = ObjectId>) -> Self {
        Filter::Ids(ids.into_iter().collect())
    }

    pub fn eq(path: &[&str], value: impl Into<Value>) -> Self {
        Filter::Eq {
            path: path.iter().map(|segment| segment.to_string()).collect(),
            value: value.into(),
        }
    }

    pub fn lte(path: &[&str], value: impl Into<String>) -> Self {
        Filter::Lte {
            path: path.iter().map(|segment| segment.to_string()).collect(),
            value: value.into(),
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Ids(ids) => document
                .get("_id")
                .and_then(Value::as_str)
                .and_then(|id| ObjectId::from_hex(id).ok())
                .is_some_and(|id| ids.contains(&id)),
            Filter::Eq { path, value } => lookup(document, path) == Some(value),
            Filter::Lte { path, value } => lookup(document, path)
                .and_then(Value::as_str)
                .is_some_and(|field| field <= value.as_str()),
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(document)),
            Filter::Or(filters) => filters.iter().any(|filter| filter.matches(document)),
        }
    }
}

fn lookup<'a>(document: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(document, |value, segment| value.get(segment.as_str()))
}

/// One write inside a transactional bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or fully replace the document with this id.
    Upsert { id: ObjectId, document: Value },
    /// Insert the document only if no document has this id.
    InsertIfAbsent { id: ObjectId, document: Value },
    Delete { id: ObjectId },
    DeleteMany(Filter),
}
