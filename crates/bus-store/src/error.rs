//! Error types for the document-store layer

use thiserror::Error;

/// Errors surfaced by [`DocumentStore`](crate::DocumentStore) backends and
/// the typed repositories built on them
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store unreachable. Surfaced to the caller, who decides whether to
    /// retry or report. The store layer performs no retries of its own.
    #[error("store unreachable: {0}")]
    Connectivity(String),

    /// A lookup by storage id or business key found nothing
    #[error("no document in {collection} for {key}")]
    NotFound { collection: String, key: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    pub fn not_found(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            key: key.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
