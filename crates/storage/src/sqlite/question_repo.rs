use survey_core::model::{Question, QuestionId};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_question_row};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO questions (id, title, module, parent_module)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                module = excluded.module,
                parent_module = excluded.parent_module
            ",
        )
        .bind(id_to_i64("question_id", question.id.value())?)
        .bind(question.title.as_str())
        .bind(question.module.as_deref())
        .bind(question.parent_module.as_deref())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let row = sqlx::query("SELECT id, title, module, parent_module FROM questions WHERE id = ?1")
            .bind(id_to_i64("question_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_question_row).transpose()
    }
}
