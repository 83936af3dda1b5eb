//! In-process document store with optional file persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use super::{Collection, Document, DocumentStore, Fields, Query, Subscription, WriteOp};
use crate::error::{EventHubError, EventHubResult};
use crate::event::UserId;

type UserData = BTreeMap<Collection, BTreeMap<String, Fields>>;
type Data = BTreeMap<String, UserData>;

struct Subscriber {
    user: String,
    query: Query,
    tx: mpsc::UnboundedSender<EventHubResult<Vec<Document>>>,
}

#[derive(Default)]
struct Inner {
    data: Data,
    subscribers: Vec<Subscriber>,
    fail_next_commit: Option<String>,
}

/// Document store kept in memory. Batches are all-or-nothing: they are applied
/// to a copy which replaces the live data only when every operation succeeded.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
    commits: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted as JSON at `path`, loading it when the file exists.
    pub async fn open(path: impl AsRef<Path>) -> EventHubResult<Self> {
        let path = path.as_ref().to_path_buf();
        let data: Data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Data::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), users = data.len(), "Opened store");

        Ok(MemoryStore {
            inner: Mutex::new(Inner {
                data,
                ..Default::default()
            }),
            path: Some(path),
            commits: AtomicU64::new(0),
        })
    }

    /// Number of successfully committed batches.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Make the next `batch_write` fail without applying anything.
    pub async fn fail_next_commit(&self, reason: impl Into<String>) {
        self.inner.lock().await.fail_next_commit = Some(reason.into());
    }

    /// Deliver a listener error to every open subscription.
    pub async fn inject_subscription_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.lock().await;
        inner.subscribers.retain(|s| {
            s.tx.send(Err(EventHubError::StoreCommit(message.clone())))
                .is_ok()
        });
    }

    async fn persist(&self, data: &Data) -> EventHubResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(data)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn snapshot(data: &Data, user: &str, query: &Query) -> Vec<Document> {
    let mut docs: Vec<Document> = data
        .get(user)
        .and_then(|collections| collections.get(&query.collection))
        .map(|docs| {
            docs.iter()
                .map(|(id, data)| Document {
                    id: id.clone(),
                    data: data.clone(),
                })
                .collect()
        })
        .unwrap_or_default();
    query.sort(&mut docs);
    docs
}

fn apply(user_data: &mut UserData, op: WriteOp) -> EventHubResult<()> {
    match op {
        WriteOp::Set {
            collection,
            id,
            data,
            merge,
        } => {
            let docs = user_data.entry(collection).or_default();
            match docs.get_mut(&id) {
                Some(existing) if merge => existing.extend(data),
                _ => {
                    docs.insert(id, data);
                }
            }
        }
        WriteOp::Update {
            collection,
            id,
            data,
        } => {
            let existing = user_data
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(&id))
                .ok_or_else(|| {
                    EventHubError::StoreCommit(format!("update of missing document {collection}/{id}"))
                })?;
            existing.extend(data);
        }
        WriteOp::Delete { collection, id } => {
            if let Some(docs) = user_data.get_mut(&collection) {
                docs.remove(&id);
            }
        }
        WriteOp::Expect {
            collection,
            id,
            fields,
        } => {
            let current = user_data.get(&collection).and_then(|docs| docs.get(&id));
            let holds = match (&fields, current) {
                (None, None) => true,
                (Some(expected), Some(doc)) => expected
                    .iter()
                    .all(|(field, value)| doc.get(field).unwrap_or(&Value::Null) == value),
                _ => false,
            };
            if !holds {
                return Err(EventHubError::Conflict(format!("{collection}/{id}")));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_all(&self, user: &UserId, collection: Collection) -> EventHubResult<Vec<Document>> {
        let inner = self.inner.lock().await;
        Ok(snapshot(&inner.data, user.as_str(), &Query::collection(collection)))
    }

    async fn get(
        &self,
        user: &UserId,
        collection: Collection,
        id: &str,
    ) -> EventHubResult<Option<Document>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .data
            .get(user.as_str())
            .and_then(|c| c.get(&collection))
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn batch_write(&self, user: &UserId, ops: Vec<WriteOp>) -> EventHubResult<()> {
        let mut inner = self.inner.lock().await;

        if let Some(reason) = inner.fail_next_commit.take() {
            warn!(user = %user, ops = ops.len(), "Rejecting batch: {reason}");
            return Err(EventHubError::StoreCommit(reason));
        }

        let mut touched: Vec<Collection> = ops
            .iter()
            .filter(|op| op.is_write())
            .map(WriteOp::collection)
            .collect();
        touched.sort();
        touched.dedup();

        let mut next = inner.data.clone();
        let user_data = next.entry(user.as_str().to_string()).or_default();
        for op in ops {
            apply(user_data, op)?;
        }

        self.persist(&next)
            .await
            .map_err(|e| EventHubError::StoreCommit(e.to_string()))?;

        inner.data = next;
        self.commits.fetch_add(1, Ordering::SeqCst);

        let Inner {
            data, subscribers, ..
        } = &mut *inner;
        subscribers.retain(|s| {
            if s.user != user.as_str() || !touched.contains(&s.query.collection) {
                return !s.tx.is_closed();
            }
            s.tx.send(Ok(snapshot(data, &s.user, &s.query))).is_ok()
        });

        Ok(())
    }

    async fn subscribe(&self, user: &UserId, query: Query) -> EventHubResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;

        // Receiver is alive here, so the initial send cannot fail
        let _ = tx.send(Ok(snapshot(&inner.data, user.as_str(), &query)));
        inner.subscribers.push(Subscriber {
            user: user.as_str().to_string(),
            query,
            tx,
        });

        Ok(Subscription::new(rx))
    }
}
