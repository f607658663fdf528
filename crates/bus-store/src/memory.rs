//! In-memory document store
//!
//! Reference backend used by tests and the demo portal. Reproduces the
//! semantics the engine is written against: insertion-ordered first-match
//! lookups, shallow-merge updates with last-write-wins per document, and
//! full-result-set pushes to subscribers on every change. Connectivity
//! failures can be injected with [`MemoryStore::set_offline`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::subscription::RawSubscription;
use crate::{Document, DocumentStore, KeyFilter};

/// One registered listener on a collection
struct Subscriber {
    id: Uuid,
    filter: Option<KeyFilter>,
    tx: mpsc::UnboundedSender<Vec<Document>>,
}

#[derive(Default)]
struct Inner {
    /// Documents per collection, in insertion order
    collections: DashMap<String, Vec<Document>>,
    subscribers: DashMap<String, Vec<Subscriber>>,
    offline: AtomicBool,
}

/// In-memory [`DocumentStore`] backend
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing or regaining the store connection. While offline,
    /// every operation fails with [`StoreError::Connectivity`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StoreError::connectivity("store offline"));
        }
        Ok(())
    }

    /// Push the current result set to every listener on a collection,
    /// pruning listeners whose receiving side is gone
    fn notify(&self, collection: &str) {
        let snapshot: Vec<Document> = self
            .inner
            .collections
            .get(collection)
            .map(|docs| docs.clone())
            .unwrap_or_default();

        if let Some(mut subscribers) = self.inner.subscribers.get_mut(collection) {
            subscribers.retain(|subscriber| {
                let view: Vec<Document> = match &subscriber.filter {
                    Some(filter) => snapshot
                        .iter()
                        .filter(|doc| filter.matches(&doc.fields))
                        .cloned()
                        .collect(),
                    None => snapshot.clone(),
                };
                subscriber.tx.send(view).is_ok()
            });
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.check_online()?;
        Ok(self
            .inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id).cloned()))
    }

    async fn get_by_key(
        &self,
        collection: &str,
        filter: &KeyFilter,
    ) -> StoreResult<Option<Document>> {
        self.check_online()?;
        // first match in insertion order; duplicates are tolerated, not fixed
        Ok(self
            .inner
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| filter.matches(&doc.fields)).cloned()))
    }

    async fn get_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.check_online()?;
        Ok(self
            .inner
            .collections
            .get(collection)
            .map(|docs| docs.clone())
            .unwrap_or_default())
    }

    async fn create(&self, collection: &str, fields: Value) -> StoreResult<String> {
        self.check_online()?;
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            fields,
            created_at: now,
            last_updated: now,
        };
        let id = document.id.clone();

        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);

        self.notify(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Value) -> StoreResult<()> {
        self.check_online()?;
        {
            let mut docs = self
                .inner
                .collections
                .get_mut(collection)
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            let document = docs
                .iter_mut()
                .find(|doc| doc.id == id)
                .ok_or_else(|| StoreError::not_found(collection, id))?;

            match (document.fields.as_object_mut(), fields.as_object()) {
                (Some(existing), Some(patch)) => {
                    for (key, value) in patch {
                        existing.insert(key.clone(), value.clone());
                    }
                }
                _ => document.fields = fields,
            }
            document.last_updated = Utc::now();
        }

        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check_online()?;
        let removed = {
            let mut docs = match self.inner.collections.get_mut(collection) {
                Some(docs) => docs,
                None => return Ok(()),
            };
            let before = docs.len();
            docs.retain(|doc| doc.id != id);
            docs.len() != before
        };

        if removed {
            self.notify(collection);
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.check_online()
    }

    fn subscribe(
        &self,
        collection: &str,
        filter: Option<KeyFilter>,
    ) -> StoreResult<RawSubscription> {
        self.check_online()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        self.inner
            .subscribers
            .entry(collection.to_string())
            .or_default()
            .push(Subscriber { id, filter, tx });

        let inner = Arc::clone(&self.inner);
        let collection = collection.to_string();
        Ok(RawSubscription::new(rx, move || {
            if let Some(mut subscribers) = inner.subscribers.get_mut(&collection) {
                subscribers.retain(|subscriber| subscriber.id != id);
            }
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================
