//! Document store contract.
//!
//! The engine persists everything through `DocumentStore`: per-user
//! collections of JSON documents with atomic batch writes and push-based
//! subscriptions. `MemoryStore` is the bundled implementation.

mod memory;

pub use memory::MemoryStore;

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{EventHubError, EventHubResult};
use crate::event::{StoredEvent, UserId};

pub type Fields = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Events,
    Notifications,
    SyncQueue,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Collection::Events => "events",
            Collection::Notifications => "notifications",
            Collection::SyncQueue => "sync_queue",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Fields,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> EventHubResult<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Serialize a value into document fields. Fails unless it serializes to a JSON object.
pub fn to_fields<T: Serialize>(value: &T) -> EventHubResult<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(EventHubError::Serialization(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Decode every document, failing on the first malformed one.
pub fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> EventHubResult<Vec<T>> {
    docs.iter().map(Document::decode).collect()
}

/// One operation of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite. With `merge`, fields are merged shallowly into an existing document.
    Set {
        collection: Collection,
        id: String,
        data: Fields,
        merge: bool,
    },
    /// Merge fields into an existing document; a missing document fails the whole batch.
    Update {
        collection: Collection,
        id: String,
        data: Fields,
    },
    Delete { collection: Collection, id: String },
    /// Precondition on the state the batch was planned from. With `fields`, each
    /// listed field must hold the given value (a missing field reads as null);
    /// without, the document must not exist. A mismatch fails the batch with `Conflict`.
    Expect {
        collection: Collection,
        id: String,
        fields: Option<Fields>,
    },
}

impl WriteOp {
    pub fn set<T: Serialize>(collection: Collection, id: impl Into<String>, value: &T) -> EventHubResult<Self> {
        Ok(WriteOp::Set {
            collection,
            id: id.into(),
            data: to_fields(value)?,
            merge: false,
        })
    }

    pub fn merge<T: Serialize>(collection: Collection, id: impl Into<String>, value: &T) -> EventHubResult<Self> {
        Ok(WriteOp::Set {
            collection,
            id: id.into(),
            data: to_fields(value)?,
            merge: true,
        })
    }

    pub fn update(collection: Collection, id: impl Into<String>, data: Fields) -> Self {
        WriteOp::Update {
            collection,
            id: id.into(),
            data,
        }
    }

    pub fn delete(collection: Collection, id: impl Into<String>) -> Self {
        WriteOp::Delete {
            collection,
            id: id.into(),
        }
    }

    pub fn expect(collection: Collection, id: impl Into<String>, fields: Fields) -> Self {
        WriteOp::Expect {
            collection,
            id: id.into(),
            fields: Some(fields),
        }
    }

    pub fn expect_absent(collection: Collection, id: impl Into<String>) -> Self {
        WriteOp::Expect {
            collection,
            id: id.into(),
            fields: None,
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Set { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. }
            | WriteOp::Expect { collection, .. } => *collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WriteOp::Set { id, .. }
            | WriteOp::Update { id, .. }
            | WriteOp::Delete { id, .. }
            | WriteOp::Expect { id, .. } => id,
        }
    }

    /// Whether the operation changes data, as opposed to only checking it.
    pub fn is_write(&self) -> bool {
        !matches!(self, WriteOp::Expect { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A whole-collection query with an optional ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn collection(collection: Collection) -> Self {
        Query {
            collection,
            order_by: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Sort documents by the query's field. Documents lacking the field sort last; ties keep id order.
    pub fn sort(&self, docs: &mut [Document]) {
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        let Some((field, direction)) = &self.order_by else {
            return;
        };
        docs.sort_by(|a, b| match (a.data.get(field), b.data.get(field)) {
            (Some(x), Some(y)) => {
                let ord = compare_values(x, y);
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }
}

/// Timestamps compare as instants, numbers numerically, anything else by its string form.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (
                x.parse::<DateTime<Utc>>(),
                y.parse::<DateTime<Utc>>(),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// A live query. Yields the current snapshot first, then one per commit touching the collection.
/// Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<EventHubResult<Vec<Document>>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<EventHubResult<Vec<Document>>>) -> Self {
        Subscription { rx }
    }

    /// Next snapshot or listener error. `None` once the store has gone away.
    pub async fn next(&mut self) -> Option<EventHubResult<Vec<Document>>> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_all(&self, user: &UserId, collection: Collection) -> EventHubResult<Vec<Document>>;

    async fn get(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
    ) -> EventHubResult<Option<Document>>;

    /// Apply every operation or none of them.
    async fn batch_write(&self, user: &UserId, ops: Vec<WriteOp>) -> EventHubResult<()>;

    async fn subscribe(&self, user: &UserId, query: Query) -> EventHubResult<Subscription>;
}

/// All stored events of a user.
pub async fn load_events(
    store: &dyn DocumentStore,
    user: &UserId,
) -> EventHubResult<Vec<StoredEvent>> {
    let docs = store.get_all(user, Collection::Events).await?;
    decode_all(&docs)
}

pub async fn load_event(
    store: &dyn DocumentStore,
    user: &UserId,
    id: &str,
) -> EventHubResult<Option<StoredEvent>> {
    store
        .get(user, Collection::Events, id)
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, data: Value) -> Document {
        let Value::Object(data) = data else {
            panic!("object expected");
        };
        Document {
            id: id.to_string(),
            data,
        }
    }

    #[test]
    fn timestamps_sort_as_instants() {
        let mut docs = vec![
            doc("a", json!({"start": "2025-01-01T10:00:00+02:00"})),
            doc("b", json!({"start": "2025-01-01T09:00:00Z"})),
            doc("c", json!({})),
        ];
        Query::collection(Collection::Events)
            .order_by("start", Direction::Ascending)
            .sort(&mut docs);
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn numbers_sort_numerically_descending() {
        let mut docs = vec![
            doc("a", json!({"n": 2})),
            doc("b", json!({"n": 10})),
        ];
        Query::collection(Collection::Events)
            .order_by("n", Direction::Descending)
            .sort(&mut docs);
        assert_eq!(docs[0].id, "b");
    }

    #[test]
    fn to_fields_rejects_non_objects() {
        assert!(to_fields(&42).is_err());
        assert!(to_fields(&json!({"a": 1})).is_ok());
    }
}
