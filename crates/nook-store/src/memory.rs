use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::query::{Direction, Document, Fields, OrderBy, Predicate, QueryPage, StoreCursor};
use crate::traits::DocumentStore;

/// Timeout reported for injected write timeouts.
const INJECTED_TIMEOUT: Duration = Duration::from_secs(10);

/// Injected failures, consumed by the next matching calls.
#[derive(Debug, Default)]
struct FaultPlan {
    unavailable: bool,
    failing_writes: usize,
    timed_out_writes: usize,
}

/// Start-after position encoded inside a [`StoreCursor`].
#[derive(Serialize, Deserialize)]
struct CursorKey {
    key: Value,
    id: String,
}

/// In-memory, HashMap-based document store.
///
/// Intended for tests, demos, and embedding. Collections are held behind a
/// `RwLock`; documents are cloned on read and write. Failures can be injected
/// to exercise rollback paths without a network.
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    faults: Mutex<FaultPlan>,
}

impl InMemoryDocumentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            faults: Mutex::new(FaultPlan::default()),
        }
    }

    /// Insert or replace a document directly, bypassing fault injection.
    pub fn insert(&self, collection: &str, id: impl Into<String>, fields: Fields) {
        self.collections
            .write()
            .expect("lock poisoned")
            .entry(collection.to_string())
            .or_default()
            .insert(id.into(), fields);
    }

    /// Delete a document directly. Returns `true` if it existed.
    pub fn remove(&self, collection: &str, id: &str) -> bool {
        self.collections
            .write()
            .expect("lock poisoned")
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Read a document's fields directly.
    pub fn peek(&self, collection: &str, id: &str) -> Option<Fields> {
        self.collections
            .read()
            .expect("lock poisoned")
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .expect("lock poisoned")
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the collection holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Make every call fail with [`StoreError::Unavailable`] until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().expect("lock poisoned").unavailable = unavailable;
    }

    /// Fail the next `n` writes with [`StoreError::Unavailable`].
    pub fn fail_next_writes(&self, n: usize) {
        self.faults.lock().expect("lock poisoned").failing_writes = n;
    }

    /// Fail the next `n` writes with [`StoreError::Timeout`].
    pub fn time_out_next_writes(&self, n: usize) {
        self.faults.lock().expect("lock poisoned").timed_out_writes = n;
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.faults.lock().expect("lock poisoned").unavailable {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }

    fn take_write_fault(&self) -> StoreResult<()> {
        let mut faults = self.faults.lock().expect("lock poisoned");
        if faults.unavailable {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        if faults.timed_out_writes > 0 {
            faults.timed_out_writes -= 1;
            return Err(StoreError::Timeout(INJECTED_TIMEOUT));
        }
        if faults.failing_writes > 0 {
            faults.failing_writes -= 1;
            return Err(StoreError::Unavailable("write rejected".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order: &OrderBy,
        limit: usize,
        cursor: Option<&StoreCursor>,
    ) -> StoreResult<QueryPage> {
        self.check_available()?;
        let after = cursor.map(decode_cursor).transpose()?;

        let map = self.collections.read().expect("lock poisoned");
        let Some(docs) = map.get(collection) else {
            return Ok(QueryPage::empty());
        };

        let mut matching: Vec<(&String, &Fields)> = docs
            .iter()
            .filter(|(_, fields)| predicates.iter().all(|p| p.matches(fields)))
            .collect();
        matching.sort_by(|a, b| {
            compare_positions(order, a.1.get(&order.field), a.0, b.1.get(&order.field), b.0)
        });

        let documents: Vec<Document> = matching
            .into_iter()
            .filter(|(id, fields)| match &after {
                Some(pos) => {
                    compare_positions(order, fields.get(&order.field), id, Some(&pos.key), &pos.id)
                        == Ordering::Greater
                }
                None => true,
            })
            .take(limit)
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect();

        let cursor = match documents.last() {
            Some(last) if documents.len() == limit => Some(encode_cursor(
                last.get(&order.field).cloned().unwrap_or(Value::Null),
                &last.id,
            )?),
            _ => None,
        };

        debug!(
            collection,
            returned = documents.len(),
            has_more = cursor.is_some(),
            "query served from memory"
        );
        Ok(QueryPage { documents, cursor })
    }

    async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Document> {
        self.check_available()?;
        self.peek(collection, id)
            .map(|fields| Document::new(id, fields))
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.take_write_fault()?;
        self.insert(collection, id, fields);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collections = self.collections.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryDocumentStore")
            .field("collections", &collections)
            .finish()
    }
}

fn encode_cursor(key: Value, id: &str) -> StoreResult<StoreCursor> {
    let bytes = serde_json::to_vec(&CursorKey {
        key,
        id: id.to_string(),
    })
    .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(StoreCursor::from_token(hex::encode(bytes)))
}

fn decode_cursor(cursor: &StoreCursor) -> StoreResult<CursorKey> {
    let bytes =
        hex::decode(cursor.as_token()).map_err(|e| StoreError::InvalidCursor(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidCursor(e.to_string()))
}

/// Position of `(key_a, id_a)` relative to `(key_b, id_b)` in result order.
fn compare_positions(
    order: &OrderBy,
    key_a: Option<&Value>,
    id_a: &str,
    key_b: Option<&Value>,
    id_b: &str,
) -> Ordering {
    let natural = compare_values(key_a, key_b).then_with(|| id_a.cmp(id_b));
    match order.direction {
        Direction::Ascending => natural,
        Direction::Descending => natural.reverse(),
    }
}

/// Total order over JSON values, close to what document databases use:
/// missing < null < bool < number < string < array < object. Among strings,
/// RFC 3339 timestamps sort before all other strings and compare
/// chronologically; the rest compare bytewise. Arrays compare by length.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => {
                match (parse_timestamp(x), parse_timestamp(y)) {
                    (Some(tx), Some(ty)) => tx.cmp(&ty),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => x.cmp(y),
                }
            }
            (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
