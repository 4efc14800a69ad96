use std::sync::Arc;

use learn_core::PartialProgress;
use learn_core::model::{Progress, UserId};
use storage::record::ProgressRecord;
use storage::repository::ProgressRepository;
use tracing::{debug, error};

use crate::error::ProgressError;

/// The only path from the progress store to the remote document store.
///
/// Storage failures are converted into `ProgressError::RemoteRead` /
/// `ProgressError::RemoteWrite` here.
#[derive(Clone)]
pub struct SyncGateway {
    repo: Arc<dyn ProgressRepository>,
}

impl SyncGateway {
    #[must_use]
    pub fn new(repo: Arc<dyn ProgressRepository>) -> Self {
        Self { repo }
    }

    /// Load and decode the learner's remote record.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::RemoteRead` if the store cannot be read.
    pub async fn load(&self, user: &UserId) -> Result<Option<PartialProgress>, ProgressError> {
        match self.repo.load_progress(user).await {
            Ok(record) => {
                debug!(user = %user, found = record.is_some(), "loaded remote progress");
                Ok(record.map(ProgressRecord::into_partial))
            }
            Err(err) => {
                error!(user = %user, %err, "remote progress read failed");
                Err(ProgressError::RemoteRead(err))
            }
        }
    }

    /// Persist the full snapshot as the learner's remote record.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::RemoteWrite` if the store rejects the write.
    pub async fn save(&self, user: &UserId, progress: &Progress) -> Result<(), ProgressError> {
        let record = ProgressRecord::from_progress(progress);
        self.repo.save_progress(user, &record).await.map_err(|err| {
            error!(user = %user, %err, "remote progress write failed");
            ProgressError::RemoteWrite(err)
        })
    }
}
