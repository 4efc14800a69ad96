use std::sync::Arc;

use learn_core::model::ModuleCatalog;
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::progress::{ProgressStore, SyncGateway};

/// Assembles app-facing services over a chosen storage backend.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<ModuleCatalog>,
    progress: Arc<ProgressStore>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, ModuleCatalog::standard(), clock))
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, catalog: ModuleCatalog, clock: Clock) -> Self {
        let catalog = Arc::new(catalog);
        let gateway = SyncGateway::new(Arc::clone(&storage.progress));
        let progress = Arc::new(ProgressStore::new(gateway, Arc::clone(&catalog), clock));
        Self { catalog, progress }
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<ModuleCatalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.progress)
    }
}
