use survey_core::model::{FormId, Token};
use survey_core::time::to_millis;

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_progress_row};
use crate::repository::{ProgressRecord, ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let page_id = record
            .current_page_id
            .map(|id| id_to_i64("current_page_id", id))
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO progress (
                token, form_id, current_page_id, current_page_url,
                module_progress, last_visited_url, last_visited_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(token, form_id) DO UPDATE SET
                current_page_id = excluded.current_page_id,
                current_page_url = excluded.current_page_url,
                module_progress = excluded.module_progress,
                last_visited_url = excluded.last_visited_url,
                last_visited_at = excluded.last_visited_at,
                updated_at = excluded.updated_at
            ",
        )
        .bind(record.token.as_str())
        .bind(record.form_id.as_str())
        .bind(page_id)
        .bind(record.current_page_url.as_deref())
        .bind(record.module_progress.as_deref())
        .bind(record.last_visited_url.as_deref())
        .bind(record.last_visited_at.map(to_millis))
        .bind(to_millis(record.updated_at))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_progress(
        &self,
        token: &Token,
        form_id: &FormId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT token, form_id, current_page_id, current_page_url,
                   module_progress, last_visited_url, last_visited_at, updated_at
            FROM progress
            WHERE token = ?1 AND form_id = ?2
            ",
        )
        .bind(token.as_str())
        .bind(form_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }
}
