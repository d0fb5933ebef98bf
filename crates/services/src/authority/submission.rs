use std::sync::Arc;

use storage::repository::ResponseRepository;
use survey_core::model::{AnswerSet, FormId, SurveyResponse};
use tracing::{info, warn};

use super::tokens::{TokenAuthority, parse_token_field};
use crate::Clock;
use crate::error::AuthorityError;

pub const SUBMIT_THANKS: &str = "Thank you for your response!";

/// Appends survey answers after re-checking the token.
#[derive(Clone)]
pub struct SubmissionService {
    clock: Clock,
    authority: TokenAuthority,
    responses: Arc<dyn ResponseRepository>,
}

impl SubmissionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        authority: TokenAuthority,
        responses: Arc<dyn ResponseRepository>,
    ) -> Self {
        Self {
            clock,
            authority,
            responses,
        }
    }

    /// Store one row per answered question and return how many were stored.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::InvalidOrExpired` when the token is no longer
    /// valid, `NoAnswersSaved` when no answer carries text, or `Storage`.
    pub async fn submit(
        &self,
        token: Option<&str>,
        form_id: Option<&str>,
        answers: &AnswerSet,
    ) -> Result<usize, AuthorityError> {
        let token = parse_token_field(token)?;
        if !self.authority.is_valid(&token).await? {
            warn!(token = %token, "submission with invalid token");
            return Err(AuthorityError::InvalidOrExpired);
        }
        let form_id = FormId::or_default(form_id)?;
        let now = self.clock.now();

        let rows: Vec<SurveyResponse> = answers
            .stored_answers()
            .map(|(question_id, answer)| SurveyResponse {
                question_id,
                token: token.clone(),
                form_id: form_id.clone(),
                answer,
                created_at: now,
            })
            .collect();
        if rows.is_empty() {
            return Err(AuthorityError::NoAnswersSaved);
        }

        let saved = self.responses.append_responses(&rows).await?;
        if saved == 0 {
            return Err(AuthorityError::NoAnswersSaved);
        }
        info!(token = %token, form_id = %form_id, saved, "survey submitted");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storage::repository::{InMemoryRepository, TokenRepository};
    use survey_core::model::{AnswerValue, QuestionId, Token, TokenRecord};
    use survey_core::time::fixed_now;

    async fn service(expires_in: Duration) -> (SubmissionService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        repo.insert_token(
            &TokenRecord::new(
                Token::parse("A1234").unwrap(),
                None,
                None,
                now - Duration::days(1),
                now + expires_in,
            )
            .unwrap(),
        )
        .await
        .unwrap();
        let clock = Clock::fixed(now);
        let authority = TokenAuthority::new(clock, Arc::new(repo.clone()));
        (
            SubmissionService::new(clock, authority, Arc::new(repo.clone())),
            repo,
        )
    }

    fn answers() -> AnswerSet {
        [
            (QuestionId::new(1), AnswerValue::Single("Yes".into())),
            (
                QuestionId::new(2),
                AnswerValue::Multiple(vec!["Red".into(), "Blue".into()]),
            ),
            (QuestionId::new(3), AnswerValue::Single("   ".into())),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn stores_one_row_per_answered_question() {
        let (svc, repo) = service(Duration::days(1)).await;
        let saved = svc.submit(Some("A1234"), None, &answers()).await.unwrap();
        assert_eq!(saved, 2);

        let views = repo
            .responses_for_token(&Token::parse("A1234").unwrap())
            .await
            .unwrap();
        assert_eq!(views.len(), 2);
        assert!(views.iter().any(|v| v.answer == "Red, Blue"));
        assert!(views.iter().all(|v| v.form_id.as_str() == "default"));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (svc, _) = service(Duration::zero()).await;
        assert!(matches!(
            svc.submit(Some("A1234"), Some("intake"), &answers()).await,
            Err(AuthorityError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn empty_answers_report_nothing_saved() {
        let (svc, _) = service(Duration::days(1)).await;
        assert!(matches!(
            svc.submit(Some("A1234"), None, &AnswerSet::new()).await,
            Err(AuthorityError::NoAnswersSaved)
        ));
    }
}
