use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use survey_core::model::{
    FormId, Question, QuestionId, ResponseView, SurveyResponse, Token, TokenRecord,
};
use survey_core::time::from_millis;

use crate::repository::{ProgressRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn time_from_millis(field: &'static str, v: i64) -> Result<DateTime<Utc>, StorageError> {
    from_millis(v).ok_or_else(|| StorageError::Serialization(format!("{field} out of range")))
}

fn optional_time(field: &'static str, v: Option<i64>) -> Result<Option<DateTime<Utc>>, StorageError> {
    v.map(|ms| time_from_millis(field, ms)).transpose()
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

fn token_from_row(row: &SqliteRow, column: &str) -> Result<Token, StorageError> {
    let raw: String = row.try_get(column).map_err(ser)?;
    Token::parse(&raw).map_err(ser)
}

fn form_id_from_row(row: &SqliteRow, column: &str) -> Result<FormId, StorageError> {
    let raw: String = row.try_get(column).map_err(ser)?;
    FormId::new(raw).map_err(ser)
}

pub(crate) fn map_token_row(row: &SqliteRow) -> Result<TokenRecord, StorageError> {
    let login_count_i64: i64 = row.try_get("login_count").map_err(ser)?;
    let login_count = u32::try_from(login_count_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid login_count: {login_count_i64}"))
    })?;

    TokenRecord::from_persisted(
        token_from_row(row, "token")?,
        row.try_get("owner_name").map_err(ser)?,
        row.try_get("study_group").map_err(ser)?,
        time_from_millis("created_at", row.try_get("created_at").map_err(ser)?)?,
        time_from_millis("expires_at", row.try_get("expires_at").map_err(ser)?)?,
        row.try_get::<i64, _>("used").map_err(ser)? != 0,
        login_count,
        optional_time("last_used_at", row.try_get("last_used_at").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    Ok(ProgressRecord {
        token: token_from_row(row, "token")?,
        form_id: form_id_from_row(row, "form_id")?,
        current_page_id: row
            .try_get::<Option<i64>, _>("current_page_id")
            .map_err(ser)?
            .map(|v| i64_to_u64("current_page_id", v))
            .transpose()?,
        current_page_url: row.try_get("current_page_url").map_err(ser)?,
        module_progress: row.try_get("module_progress").map_err(ser)?,
        last_visited_url: row.try_get("last_visited_url").map_err(ser)?,
        last_visited_at: optional_time(
            "last_visited_at",
            row.try_get("last_visited_at").map_err(ser)?,
        )?,
        updated_at: time_from_millis("updated_at", row.try_get("updated_at").map_err(ser)?)?,
    })
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    Ok(Question {
        id: question_id_from_i64(row.try_get("id").map_err(ser)?)?,
        title: row.try_get("title").map_err(ser)?,
        module: row.try_get("module").map_err(ser)?,
        parent_module: row.try_get("parent_module").map_err(ser)?,
    })
}

/// Maps a `responses LEFT JOIN questions` row.
pub(crate) fn map_response_view_row(row: &SqliteRow) -> Result<ResponseView, StorageError> {
    let response = SurveyResponse {
        question_id: question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
        token: token_from_row(row, "token")?,
        form_id: form_id_from_row(row, "form_id")?,
        answer: row.try_get("answer").map_err(ser)?,
        created_at: time_from_millis("created_at", row.try_get("created_at").map_err(ser)?)?,
    };
    let title: Option<String> = row.try_get("question_title").map_err(ser)?;
    let module: Option<String> = row.try_get("module").map_err(ser)?;
    let parent_module: Option<String> = row.try_get("parent_module").map_err(ser)?;
    let question = title.map(|title| Question {
        id: response.question_id,
        title,
        module,
        parent_module,
    });
    Ok(ResponseView::from_parts(response, question.as_ref()))
}
