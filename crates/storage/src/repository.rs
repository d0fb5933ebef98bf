use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use survey_core::model::{
    FormId, Question, QuestionId, ResponseView, SurveyResponse, Token, TokenRecord,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape of a (token, form) progress row.
///
/// `module_progress` is kept as the raw JSON blob; callers sanitise it on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub token: Token,
    pub form_id: FormId,
    pub current_page_id: Option<u64>,
    pub current_page_url: Option<String>,
    pub module_progress: Option<String>,
    pub last_visited_url: Option<String>,
    pub last_visited_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counters for issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TokenStats {
    pub total: u64,
    pub active: u64,
    pub used: u64,
    pub expired: u64,
    pub total_logins: u64,
    /// Mean login count over tokens that logged in at least once.
    pub average_logins: Option<f64>,
}

/// Repository contract for issued tokens.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Persist a new token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the token already exists.
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StorageError>;

    /// Fetch a token regardless of its state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_token(&self, token: &Token) -> Result<Option<TokenRecord>, StorageError>;

    /// Fetch a token only if it is unused and `expires_at > now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn find_valid_token(
        &self,
        token: &Token,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenRecord>, StorageError>;

    /// Atomically increment the login count and stamp last use.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn record_login(&self, token: &Token, now: DateTime<Utc>) -> Result<(), StorageError>;

    /// Deactivate a token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the token does not exist.
    async fn mark_token_used(&self, token: &Token, now: DateTime<Utc>)
    -> Result<(), StorageError>;

    /// Counters over all tokens, evaluated at `now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn token_stats(&self, now: DateTime<Utc>) -> Result<TokenStats, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Insert or replace the row for `(record.token, record.form_id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_progress(
        &self,
        token: &Token,
        form_id: &FormId,
    ) -> Result<Option<ProgressRecord>, StorageError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError>;
}

/// Append-only response rows.
#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Append rows and return how many were stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the batch cannot be written; nothing is stored then.
    async fn append_responses(&self, responses: &[SurveyResponse]) -> Result<usize, StorageError>;

    /// Responses for a token joined with their questions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn responses_for_token(&self, token: &Token) -> Result<Vec<ResponseView>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tokens: Arc<Mutex<HashMap<Token, TokenRecord>>>,
    progress: Arc<Mutex<HashMap<(Token, FormId), ProgressRecord>>>,
    questions: Arc<Mutex<HashMap<QuestionId, Question>>>,
    responses: Arc<Mutex<Vec<SurveyResponse>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl TokenRepository for InMemoryRepository {
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StorageError> {
        let mut guard = self.tokens.lock().map_err(poisoned)?;
        if guard.contains_key(record.token()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(record.token().clone(), record.clone());
        Ok(())
    }

    async fn get_token(&self, token: &Token) -> Result<Option<TokenRecord>, StorageError> {
        let guard = self.tokens.lock().map_err(poisoned)?;
        Ok(guard.get(token).cloned())
    }

    async fn find_valid_token(
        &self,
        token: &Token,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenRecord>, StorageError> {
        let guard = self.tokens.lock().map_err(poisoned)?;
        Ok(guard.get(token).filter(|r| r.is_valid_at(now)).cloned())
    }

    async fn record_login(&self, token: &Token, now: DateTime<Utc>) -> Result<(), StorageError> {
        let mut guard = self.tokens.lock().map_err(poisoned)?;
        let record = guard.get_mut(token).ok_or(StorageError::NotFound)?;
        record.record_login(now);
        Ok(())
    }

    async fn mark_token_used(
        &self,
        token: &Token,
        now: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.tokens.lock().map_err(poisoned)?;
        let record = guard.get_mut(token).ok_or(StorageError::NotFound)?;
        record.mark_used(now);
        Ok(())
    }

    async fn token_stats(&self, now: DateTime<Utc>) -> Result<TokenStats, StorageError> {
        let guard = self.tokens.lock().map_err(poisoned)?;
        let mut stats = TokenStats::default();
        let mut logged_in = 0_u64;
        for record in guard.values() {
            stats.total += 1;
            match record.status_at(now) {
                survey_core::model::TokenStatus::Active => stats.active += 1,
                survey_core::model::TokenStatus::Used => stats.used += 1,
                survey_core::model::TokenStatus::Expired => stats.expired += 1,
            }
            let logins = u64::from(record.login_count());
            stats.total_logins += logins;
            if logins > 0 {
                logged_in += 1;
            }
        }
        if logged_in > 0 {
            #[allow(clippy::cast_precision_loss)]
            let average = stats.total_logins as f64 / logged_in as f64;
            stats.average_logins = Some(average);
        }
        Ok(stats)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert(
            (record.token.clone(), record.form_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn get_progress(
        &self,
        token: &Token,
        form_id: &FormId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(token.clone(), form_id.clone())).cloned())
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(poisoned)?;
        guard.insert(question.id, question.clone());
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let guard = self.questions.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }
}

#[async_trait]
impl ResponseRepository for InMemoryRepository {
    async fn append_responses(&self, responses: &[SurveyResponse]) -> Result<usize, StorageError> {
        let mut guard = self.responses.lock().map_err(poisoned)?;
        guard.extend_from_slice(responses);
        Ok(responses.len())
    }

    async fn responses_for_token(&self, token: &Token) -> Result<Vec<ResponseView>, StorageError> {
        let rows: Vec<SurveyResponse> = {
            let guard = self.responses.lock().map_err(poisoned)?;
            guard
                .iter()
                .rev()
                .filter(|r| &r.token == token)
                .cloned()
                .collect()
        };
        let questions = self.questions.lock().map_err(poisoned)?;
        let mut views: Vec<ResponseView> = rows
            .into_iter()
            .map(|r| {
                let question = questions.get(&r.question_id);
                ResponseView::from_parts(r, question)
            })
            .collect();
        // Rows are already newest-inserted first; the stable sort keeps that for equal times.
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(views)
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub tokens: Arc<dyn TokenRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub responses: Arc<dyn ResponseRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            tokens: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            responses: Arc::new(repo),
        }
    }
}
