use survey_core::model::{ResponseView, SurveyResponse, Token};
use survey_core::time::to_millis;

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_response_view_row};
use crate::repository::{ResponseRepository, StorageError};

#[async_trait::async_trait]
impl ResponseRepository for SqliteRepository {
    async fn append_responses(&self, responses: &[SurveyResponse]) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let mut inserted = 0_usize;
        for response in responses {
            let res = sqlx::query(
                r"
                INSERT INTO responses (question_id, token, form_id, answer, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(id_to_i64("question_id", response.question_id.value())?)
            .bind(response.token.as_str())
            .bind(response.form_id.as_str())
            .bind(response.answer.as_str())
            .bind(to_millis(response.created_at))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
            inserted += usize::try_from(res.rows_affected()).unwrap_or(0);
        }
        tx.commit().await.map_err(conn)?;
        Ok(inserted)
    }

    async fn responses_for_token(&self, token: &Token) -> Result<Vec<ResponseView>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT r.question_id, r.token, r.form_id, r.answer, r.created_at,
                   q.title AS question_title, q.module, q.parent_module
            FROM responses r
            LEFT JOIN questions q ON q.id = r.question_id
            WHERE r.token = ?1
            ORDER BY r.created_at DESC, r.id DESC
            ",
        )
        .bind(token.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(map_response_view_row(&row)?);
        }
        Ok(views)
    }
}
