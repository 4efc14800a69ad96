use async_trait::async_trait;
use chrono::Utc;
use learn_core::model::UserId;
use sqlx::Row;
use tracing::warn;

use super::SqliteRepository;
use crate::record::ProgressRecord;
use crate::repository::{ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_progress(&self, user: &UserId) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT document
            FROM progress_documents
            WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let document: String = row
            .try_get("document")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        match ProgressRecord::from_json(&document) {
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
        let document = record.to_json()?;

        sqlx::query(
            r"
            INSERT INTO progress_documents (user_id, document, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user.as_str())
        .bind(document)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }
}
