use async_trait::async_trait;
use learn_core::model::UserId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

use crate::record::ProgressRecord;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for per-learner progress documents.
///
/// Writes replace the whole document; there is no compare-and-set, so two
/// writers that both read before either writes will lose one update.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the stored document for a learner.
    ///
    /// Returns `Ok(None)` when the learner has no document yet, or when the
    /// stored document is not a JSON object at all.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn load_progress(&self, user: &UserId) -> Result<Option<ProgressRecord>, StorageError>;

    /// Persist the full document for a learner, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn save_progress(&self, user: &UserId, record: &ProgressRecord)
    -> Result<(), StorageError>;
}

/// Simple in-memory document store for testing and prototyping.
///
/// Documents are kept as JSON values so reads go through the same lenient
/// decoding as the SQLite adapter.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    documents: Arc<Mutex<HashMap<UserId, Value>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Store a raw JSON document, bypassing the record type.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_document(&self, user: &UserId, document: Value) -> Result<(), StorageError> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(user.clone(), document);
        Ok(())
    }

    /// Raw JSON document currently stored for a learner.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn document(&self, user: &UserId) -> Result<Option<Value>, StorageError> {
        let guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(user).cloned())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(&self, user: &UserId) -> Result<Option<ProgressRecord>, StorageError> {
        let Some(document) = self.document(user)? else {
            return Ok(None);
        };
        match ProgressRecord::from_value(document) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(user = %user, %err, "treating unreadable progress document as absent");
                Ok(None)
            }
        }
    }

    async fn save_progress(
        &self,
        user: &UserId,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        let document = serde_json::to_value(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.put_document(user, document)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}
