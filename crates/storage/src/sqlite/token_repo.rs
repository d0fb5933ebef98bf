use chrono::{DateTime, Utc};
use sqlx::Row;
use survey_core::model::{Token, TokenRecord};
use survey_core::time::to_millis;

use super::SqliteRepository;
use super::mapping::{conn, map_token_row, ser};
use crate::repository::{StorageError, TokenRepository, TokenStats};

const TOKEN_COLUMNS: &str =
    "token, owner_name, study_group, created_at, expires_at, used, login_count, last_used_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn count(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<u64, StorageError> {
    let value: Option<i64> = row.try_get(column).map_err(ser)?;
    u64::try_from(value.unwrap_or(0))
        .map_err(|_| StorageError::Serialization(format!("{column} sign overflow")))
}

#[async_trait::async_trait]
impl TokenRepository for SqliteRepository {
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO tokens (token, owner_name, study_group, created_at, expires_at, used, login_count, last_used_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(record.token().as_str())
        .bind(record.owner_name())
        .bind(record.group())
        .bind(to_millis(record.created_at()))
        .bind(to_millis(record.expires_at()))
        .bind(i64::from(record.is_used()))
        .bind(i64::from(record.login_count()))
        .bind(record.last_used_at().map(to_millis))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                conn(e)
            }
        })?;
        Ok(())
    }

    async fn get_token(&self, token: &Token) -> Result<Option<TokenRecord>, StorageError> {
        let row = sqlx::query(&format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE token = ?1"))
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_token_row).transpose()
    }

    async fn find_valid_token(
        &self,
        token: &Token,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM tokens WHERE token = ?1 AND expires_at > ?2 AND used = 0"
        ))
        .bind(token.as_str())
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_token_row).transpose()
    }

    async fn record_login(&self, token: &Token, now: DateTime<Utc>) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE tokens
            SET login_count = login_count + 1,
                last_used_at = ?2
            WHERE token = ?1
            ",
        )
        .bind(token.as_str())
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn mark_token_used(
        &self,
        token: &Token,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE tokens SET used = 1, last_used_at = ?2 WHERE token = ?1")
            .bind(token.as_str())
            .bind(to_millis(now))
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn token_stats(&self, now: DateTime<Utc>) -> Result<TokenStats, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) AS total,
                SUM(CASE WHEN used = 0 AND expires_at > ?1 THEN 1 ELSE 0 END) AS active,
                SUM(CASE WHEN used = 1 THEN 1 ELSE 0 END) AS used,
                SUM(CASE WHEN used = 0 AND expires_at <= ?1 THEN 1 ELSE 0 END) AS expired,
                SUM(login_count) AS total_logins,
                AVG(CASE WHEN login_count > 0 THEN login_count END) AS average_logins
            FROM tokens
            ",
        )
        .bind(to_millis(now))
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        Ok(TokenStats {
            total: count(&row, "total")?,
            active: count(&row, "active")?,
            used: count(&row, "used")?,
            expired: count(&row, "expired")?,
            total_logins: count(&row, "total_logins")?,
            average_logins: row.try_get("average_logins").map_err(ser)?,
        })
    }
}
