//! # Bus Store
//!
//! Document-store abstraction for the campus bus tracking portal.
//! Defines the [`DocumentStore`] contract the engine depends on, an
//! in-memory reference backend, and the typed [`PresenceStore`] layer
//! with per-collection repositories.
//!
//! Delivery semantics expected of any backend: at-least-once pushes,
//! last-write-wins per document, no ordering across documents. Every
//! subscription pushes the full current result set on change, not a diff.

pub mod error;
pub mod memory;
pub mod presence;
pub mod subscription;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use presence::{BusRepository, DriverRepository, PresenceStore, StudentRepository};
pub use subscription::{RawSubscription, SubscriptionHandle, SubscriptionSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Collection holding student documents (wire contract)
pub const STUDENTS: &str = "students";
/// Collection holding driver documents (wire contract)
pub const DRIVERS: &str = "drivers";
/// Collection holding bus documents (wire contract)
pub const BUSES: &str = "buses";

/// A stored document: caller fields plus store-managed metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Storage-assigned identifier
    pub id: String,
    pub fields: Value,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Equality constraints for a business-key lookup or a filtered subscription
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    clauses: Vec<(String, Value)>,
}

impl KeyFilter {
    /// Single-clause filter
    pub fn field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            clauses: vec![(field.into(), value.into())],
        }
    }

    /// Add another equality clause
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// Check a document's fields against every clause
    pub fn matches(&self, fields: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| fields.get(field) == Some(value))
    }
}

impl fmt::Display for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}

/// Contract required of the underlying document store
///
/// Implementations must tolerate duplicate documents for a business key:
/// `get_by_key` returns the first match in a deterministic order rather
/// than failing. Uniqueness is a convention the store does not enforce.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a single document by storage id
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Fetch the first document matching the filter, in insertion order
    async fn get_by_key(&self, collection: &str, filter: &KeyFilter)
        -> StoreResult<Option<Document>>;

    /// Fetch every document in a collection
    async fn get_all(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Create a document, returning its storage-assigned id
    async fn create(&self, collection: &str, fields: Value) -> StoreResult<String>;

    /// Shallow-merge the given fields into an existing document
    async fn update(&self, collection: &str, id: &str, fields: Value) -> StoreResult<()>;

    /// Delete a document. Deleting an id that no longer exists is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;

    /// Probe connectivity to the backend
    async fn health_check(&self) -> StoreResult<()>;

    /// Subscribe to a collection, optionally narrowed by a filter.
    ///
    /// The returned stream receives the full filtered result set after every
    /// change to the collection. There is no snapshot on subscribe; the
    /// first push follows the first subsequent change.
    fn subscribe(&self, collection: &str, filter: Option<KeyFilter>)
        -> StoreResult<RawSubscription>;
}

// ============================================================================
// TESTS
// ============================================================================
