use std::sync::Arc;

use storage::repository::ResponseRepository;
use survey_core::model::{ResponseGroups, ResponseView};

use super::tokens::parse_token_field;
use crate::error::AuthorityError;

#[derive(Clone)]
pub struct ResponseService {
    responses: Arc<dyn ResponseRepository>,
}

impl ResponseService {
    #[must_use]
    pub fn new(responses: Arc<dyn ResponseRepository>) -> Self {
        Self { responses }
    }

    /// Responses for a token, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::TokenRequired`/`InvalidFormat` for a bad token
    /// or `Storage` if the repository fails.
    pub async fn fetch(&self, token: Option<&str>) -> Result<Vec<ResponseView>, AuthorityError> {
        let token = parse_token_field(token)?;
        Ok(self.responses.responses_for_token(&token).await?)
    }

    /// # Errors
    ///
    /// Same as [`ResponseService::fetch`].
    pub async fn fetch_grouped(
        &self,
        token: Option<&str>,
    ) -> Result<ResponseGroups, AuthorityError> {
        Ok(ResponseGroups::group(self.fetch(token).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storage::repository::{InMemoryRepository, QuestionRepository};
    use survey_core::model::{FormId, Question, QuestionId, SurveyResponse, Token};
    use survey_core::time::fixed_now;

    #[tokio::test]
    async fn grouped_fetch_orders_parents_and_keeps_newest_first() {
        let repo = InMemoryRepository::new();
        let token = Token::parse("A1234").unwrap();
        repo.upsert_question(&Question::new(QuestionId::new(1), "Sleep").in_module("Week 1", "Rest"))
            .await
            .unwrap();
        repo.upsert_question(&Question::new(QuestionId::new(2), "Naps").in_module("Week 1", "Rest"))
            .await
            .unwrap();
        let row = |id: u64, minutes: i64| SurveyResponse {
            question_id: QuestionId::new(id),
            token: token.clone(),
            form_id: FormId::default(),
            answer: format!("a{id}"),
            created_at: fixed_now() + Duration::minutes(minutes),
        };
        repo.append_responses(&[row(1, 0), row(2, 1), row(9, 2)])
            .await
            .unwrap();

        let svc = ResponseService::new(Arc::new(repo));
        let groups = svc.fetch_grouped(Some("A1234")).await.unwrap();
        let parents: Vec<_> = groups.parents().map(|(name, _)| name).collect();
        assert_eq!(parents, vec!["General", "Week 1"]);
        let rest = groups.module("Week 1", "Rest").unwrap();
        assert_eq!(rest[0].answer, "a2");
        assert_eq!(rest[1].answer, "a1");
    }

    #[tokio::test]
    async fn bad_token_format_is_rejected() {
        let svc = ResponseService::new(Arc::new(InMemoryRepository::new()));
        assert!(matches!(
            svc.fetch(Some("12345")).await,
            Err(AuthorityError::InvalidFormat(_))
        ));
    }
}
