//! Shared error types for the services crate.

use thiserror::Error;

use learn_core::model::ProgressModelError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the progress store and its sync gateway.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("no learner is signed in")]
    NoUser,
    #[error("failed to read remote progress: {0}")]
    RemoteRead(#[source] StorageError),
    #[error("failed to write remote progress: {0}")]
    RemoteWrite(#[source] StorageError),
    #[error(transparent)]
    Model(#[from] ProgressModelError),
}

impl ProgressError {
    /// Whether the failure came from the remote store (and is worth retrying).
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteRead(_) | Self::RemoteWrite(_))
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
