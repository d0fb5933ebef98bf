use std::sync::Arc;

use chrono::{DateTime, Utc};
use storage::repository::{ProgressRecord, ProgressRepository};
use survey_core::model::{FormId, Token};
use survey_core::time::{from_millis, to_millis};
use tracing::{debug, warn};

use super::tokens::parse_token_field;
use crate::Clock;
use crate::error::AuthorityError;
use crate::wire::{ProgressPayload, SaveProgressRequest};

const EMPTY_PROGRESS: &str = "{}";

/// Stores and returns per (token, form) progress rows.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, AuthorityError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthorityError::MissingField(field));
    }
    Ok(trimmed)
}

/// Returns the blob as compact JSON, or `{}` when it is missing or unparsable.
#[must_use]
pub fn sanitize_progress_blob(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return EMPTY_PROGRESS.to_owned();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => value.to_string(),
        Err(err) => {
            warn!(error = %err, "stored progress is not valid JSON, returning empty");
            EMPTY_PROGRESS.to_owned()
        }
    }
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { clock, progress }
    }

    /// Upsert the row for the request's (token, form) and return the server time.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::MissingField` when token, form id or page url is
    /// blank, `InvalidFormat`/`FormId` for malformed identifiers, or `Storage`.
    pub async fn save(&self, request: &SaveProgressRequest) -> Result<DateTime<Utc>, AuthorityError> {
        required(&request.token, "token")?;
        let form_raw = required(&request.form_id, "form_id")?;
        let page_url = required(&request.page_url, "page_url")?;
        let token = parse_token_field(Some(&request.token))?;
        let form_id = FormId::new(form_raw)?;
        let now = self.clock.now();

        let last_visited_url = request
            .last_visited_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(page_url)
            .to_owned();

        let record = ProgressRecord {
            token,
            form_id,
            current_page_id: request.page_id,
            current_page_url: Some(page_url.to_owned()),
            module_progress: request.module_progress.clone(),
            last_visited_url: Some(last_visited_url),
            last_visited_at: Some(request.timestamp.and_then(from_millis).unwrap_or(now)),
            updated_at: now,
        };
        self.progress.upsert_progress(&record).await?;
        debug!(token = %record.token, form_id = %record.form_id, "progress saved");
        Ok(now)
    }

    /// Fetch stored progress; a missing row is an empty payload, not an error.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError` for malformed identifiers or storage failures.
    pub async fn load(
        &self,
        token: Option<&str>,
        form_id: Option<&str>,
    ) -> Result<ProgressPayload, AuthorityError> {
        let token: Token = parse_token_field(token)?;
        let form_id = FormId::or_default(form_id)?;

        let Some(record) = self.progress.get_progress(&token, &form_id).await? else {
            return Ok(ProgressPayload {
                module_progress: EMPTY_PROGRESS.to_owned(),
                ..ProgressPayload::default()
            });
        };

        Ok(ProgressPayload {
            module_progress: sanitize_progress_blob(record.module_progress.as_deref()),
            current_page_id: record.current_page_id,
            current_page_url: record.current_page_url,
            last_visited_url: record.last_visited_url,
            last_visited_timestamp: record.last_visited_at.map(to_millis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;
    use survey_core::time::fixed_now;

    fn service() -> (ProgressService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        (
            ProgressService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone())),
            repo,
        )
    }

    fn request(blob: &str) -> SaveProgressRequest {
        SaveProgressRequest {
            token: "A1234".into(),
            form_id: "week-1".into(),
            page_id: Some(12),
            page_url: "https://site.test/module-1/".into(),
            module_progress: Some(blob.into()),
            last_visited_url: None,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn save_then_load_returns_blob() {
        let (svc, _) = service();
        let saved_at = svc.save(&request(r#"{"/module-1/": {"visited": true}}"#)).await.unwrap();
        assert_eq!(saved_at, fixed_now());

        let payload = svc.load(Some("A1234"), Some("week-1")).await.unwrap();
        assert_eq!(payload.module_progress, r#"{"/module-1/":{"visited":true}}"#);
        assert_eq!(payload.current_page_id, Some(12));
        assert_eq!(
            payload.last_visited_url.as_deref(),
            Some("https://site.test/module-1/")
        );
    }

    #[tokio::test]
    async fn save_requires_fields() {
        let (svc, _) = service();
        let mut req = request("{}");
        req.page_url = "  ".into();
        assert!(matches!(
            svc.save(&req).await,
            Err(AuthorityError::MissingField("page_url"))
        ));
        let mut req = request("{}");
        req.form_id = String::new();
        assert!(matches!(
            svc.save(&req).await,
            Err(AuthorityError::MissingField("form_id"))
        ));
        let mut req = request("{}");
        req.token = "A12".into();
        assert!(matches!(
            svc.save(&req).await,
            Err(AuthorityError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn missing_row_is_empty_structure() {
        let (svc, _) = service();
        let payload = svc.load(Some("A1234"), None).await.unwrap();
        assert_eq!(payload.module_progress, "{}");
        assert!(payload.current_page_url.is_none());
        assert!(payload.last_visited_timestamp.is_none());
    }

    #[tokio::test]
    async fn malformed_blob_loads_as_empty() {
        let (svc, _) = service();
        svc.save(&request("{broken")).await.unwrap();
        let payload = svc.load(Some("A1234"), Some("week-1")).await.unwrap();
        assert_eq!(payload.module_progress, "{}");
        assert_eq!(payload.current_page_id, Some(12));
    }
}
