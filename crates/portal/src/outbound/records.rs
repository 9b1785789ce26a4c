//! Contract for the document database plus an in-process implementation with
//! realtime fan-out.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

use app_core::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::domain::entity::document::Document;

#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Exists(Document),
    Missing,
}

impl Snapshot {
    fn of(doc: Option<&Document>) -> Self {
        doc.cloned().map_or(Snapshot::Missing, Snapshot::Exists)
    }
}

/// A live view of one record. The current snapshot is delivered first, then
/// one snapshot per write. Dropping the subscription releases it at the store.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Snapshot>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Snapshot>, release: impl FnOnce() + Send + 'static) -> Self {
        Self { rx, release: Some(Box::new(release)) }
    }

    /// Waits for the next snapshot. `None` once the store side has closed.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, AppError>;

    /// All records whose `field` equals `value`, in no particular order.
    async fn find(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>, AppError>;

    /// Inserts under a generated key and returns it.
    async fn create(&self, collection: &str, data: Map<String, Value>) -> Result<String, AppError>;

    async fn set(&self, collection: &str, key: &str, data: Map<String, Value>) -> Result<(), AppError>;

    /// Merges `patch` into an existing record.
    async fn update(&self, collection: &str, key: &str, patch: Map<String, Value>) -> Result<(), AppError>;

    async fn subscribe(&self, collection: &str, key: &str) -> Result<Subscription, AppError>;
}

struct Subscriber {
    collection: String,
    key: String,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Document>>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
}

impl Inner {
    fn notify(&mut self, collection: &str, key: &str) {
        let snapshot = Snapshot::of(self.collections.get(collection).and_then(|docs| docs.get(key)));
        self.subscribers.retain(|_, sub| {
            if sub.collection != collection || sub.key != key {
                return true;
            }
            sub.tx.send(snapshot.clone()).is_ok()
        });
    }
}

/// Process-local [`RecordStore`]. Last write wins.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, AppError> {
        self.inner.lock().map_err(|_| {
            tracing::error!("record store lock poisoned");
            AppError::Internal
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.subscribers.len()).unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, AppError> {
        let inner = self.lock()?;
        Ok(inner.collections.get(collection).and_then(|docs| docs.get(key)).cloned())
    }

    async fn find(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>, AppError> {
        let inner = self.lock()?;
        let Some(docs) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .values()
            .filter(|doc| doc.data.get(field).and_then(Value::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn create(&self, collection: &str, data: Map<String, Value>) -> Result<String, AppError> {
        let key = uuid::Uuid::new_v4().simple().to_string();
        let mut inner = self.lock()?;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), Document::new(key.clone(), data, Utc::now()));
        inner.notify(collection, &key);
        tracing::debug!(collection, %key, "record created");
        Ok(key)
    }

    async fn set(&self, collection: &str, key: &str, data: Map<String, Value>) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        let docs = inner.collections.entry(collection.to_string()).or_default();
        let created_at = docs.get(key).map_or_else(Utc::now, |existing| existing.created_at);
        docs.insert(key.to_string(), Document::new(key, data, created_at));
        inner.notify(collection, key);
        tracing::debug!(collection, key, "record written");
        Ok(())
    }

    async fn update(&self, collection: &str, key: &str, patch: Map<String, Value>) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(key))
            .ok_or_else(|| AppError::NotFound(format!("{collection}/{key}")))?;
        doc.data.extend(patch);
        inner.notify(collection, key);
        tracing::debug!(collection, key, "record updated");
        Ok(())
    }

    async fn subscribe(&self, collection: &str, key: &str) -> Result<Subscription, AppError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock()?;

        let current = Snapshot::of(inner.collections.get(collection).and_then(|docs| docs.get(key)));
        // The receiver is alive in this scope.
        let _ = tx.send(current);

        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner
            .subscribers
            .insert(id, Subscriber { collection: collection.to_string(), key: key.to_string(), tx });

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(rx, move || {
            let Some(inner) = weak.upgrade() else { return };
            if let Ok(mut inner) = inner.lock() {
                inner.subscribers.remove(&id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn data(value: Value) -> Map<String, Value> {
        let Value::Object(map) = value else { unreachable!() };
        map
    }

    #[tokio::test]
    async fn test_create_get_find() {
        let store = MemoryRecordStore::new();

        let key = store.create("doctors", data(json!({"email": "a@example.com"}))).await.unwrap();
        store.set("doctors", "uid-2", data(json!({"email": "b@example.com"}))).await.unwrap();

        let doc = store.get("doctors", &key).await.unwrap().unwrap();
        assert_eq!(doc.str_field("email"), Some("a@example.com"));
        assert!(store.get("patients", &key).await.unwrap().is_none());

        let found = store.find("doctors", "email", "b@example.com").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "uid-2");
        assert!(store.find("staff", "email", "b@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let store = MemoryRecordStore::new();
        store.set("patients", "uid-1", data(json!({"email": "p@example.com", "status": "Pending"}))).await.unwrap();

        store.update("patients", "uid-1", data(json!({"status": "Active"}))).await.unwrap();

        let doc = store.get("patients", "uid-1").await.unwrap().unwrap();
        assert_eq!(doc.str_field("status"), Some("Active"));
        assert_eq!(doc.str_field("email"), Some("p@example.com"));

        let missing = store.update("patients", "nobody", Map::new()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_keeps_created_at() {
        let store = MemoryRecordStore::new();
        store.set("doctors", "uid-1", data(json!({"v": 1}))).await.unwrap();
        let first = store.get("doctors", "uid-1").await.unwrap().unwrap();

        store.set("doctors", "uid-1", data(json!({"v": 2}))).await.unwrap();
        let second = store.get("doctors", "uid-1").await.unwrap().unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.data["v"], 2);
    }

    #[tokio::test]
    async fn test_subscription_delivers_current_then_changes() {
        let store = MemoryRecordStore::new();
        let mut sub = store.subscribe("doctors", "uid-1").await.unwrap();

        assert_eq!(sub.recv().await, Some(Snapshot::Missing));

        store.set("doctors", "uid-1", data(json!({"status": "pending"}))).await.unwrap();
        store.set("doctors", "uid-2", data(json!({"status": "approved"}))).await.unwrap();
        store.update("doctors", "uid-1", data(json!({"status": "approved"}))).await.unwrap();

        let Some(Snapshot::Exists(first)) = sub.recv().await else { panic!("expected snapshot") };
        assert_eq!(first.str_field("status"), Some("pending"));
        let Some(Snapshot::Exists(second)) = sub.recv().await else { panic!("expected snapshot") };
        assert_eq!(second.str_field("status"), Some("approved"));
        assert_eq!(second.key, "uid-1");
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_it() {
        let store = MemoryRecordStore::new();
        let first = store.subscribe("doctors", "uid-1").await.unwrap();
        let second = store.subscribe("doctors", "uid-1").await.unwrap();
        assert_eq!(store.subscriber_count(), 2);

        drop(first);
        assert_eq!(store.subscriber_count(), 1);

        drop(second);
        assert_eq!(store.subscriber_count(), 0);
    }
}
