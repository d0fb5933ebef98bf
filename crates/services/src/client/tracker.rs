use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use survey_core::Clock;
use survey_core::model::{FormId, LastVisited, PageDescriptor, ProgressState, VisitEntry};
use survey_core::time::{from_millis, to_millis};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::RetryPolicy;
use super::context::AuthContext;
use super::transport::SurveyApi;
use crate::error::{ProgressError, TransportError};
use crate::wire::SaveProgressRequest;

pub const RECENT_LIMIT: usize = 5;

/// The page a save is made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub page_id: Option<u64>,
    pub page_url: String,
    pub page_title: Option<String>,
}

impl PageContext {
    #[must_use]
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_id: None,
            page_url: page_url.into(),
            page_title: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, page_id: u64) -> Self {
        self.page_id = Some(page_id);
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.page_title = Some(title.into());
        self
    }
}

/// Dashboard data: visited pages, most recent first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressView {
    pub entries: Vec<VisitEntry>,
    pub last_visited: Option<VisitEntry>,
    pub recent: Vec<VisitEntry>,
    pub completed_count: usize,
}

impl ProgressView {
    /// Entries with equal timestamps keep ascending path order.
    #[must_use]
    pub fn from_state(state: &ProgressState) -> Self {
        let mut entries: Vec<VisitEntry> = state
            .entries()
            .values()
            .filter(|e| e.visited)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self {
            last_visited: entries.first().cloned(),
            recent: entries.iter().take(RECENT_LIMIT).cloned().collect(),
            completed_count: entries.len(),
            entries,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-page visit tracking for the signed-in participant.
#[derive(Clone)]
pub struct ProgressTracker {
    context: AuthContext,
    api: Arc<dyn SurveyApi>,
    form_id: FormId,
    retry: RetryPolicy,
    clock: Clock,
    state: Arc<Mutex<ProgressState>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        context: AuthContext,
        api: Arc<dyn SurveyApi>,
        form_id: FormId,
        retry: RetryPolicy,
        clock: Clock,
    ) -> Self {
        Self {
            context,
            api,
            form_id,
            retry,
            clock,
            state: Arc::new(Mutex::new(ProgressState::new())),
        }
    }

    #[must_use]
    pub fn form_id(&self) -> &FormId {
        &self.form_id
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace local state with what the server holds.
    ///
    /// A missing row or an unreadable blob both load as empty.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoSession` without a credential, or
    /// `ProgressError::Load` when the server cannot be reached.
    pub async fn load(&self) -> Result<usize, ProgressError> {
        let token = self.context.token().await.ok_or(ProgressError::NoSession)?;
        let payload = match self.api.load_progress(&token, &self.form_id).await {
            Ok(payload) => payload,
            Err(err) => {
                self.clear_on_rejection(&err).await;
                return Err(ProgressError::Load(err));
            }
        };

        let entries = ProgressState::parse_entries(&payload.module_progress).unwrap_or_else(|err| {
            warn!(error = %err, "progress blob is malformed, starting empty");
            Default::default()
        });
        let last_visited = payload.last_visited_url.and_then(|url| {
            let timestamp = payload.last_visited_timestamp.and_then(from_millis)?;
            Some(LastVisited { url, timestamp })
        });

        let loaded = ProgressState::from_parts(entries, last_visited);
        let count = loaded.len();
        *self.state() = loaded;
        debug!(token = %token, entries = count, "progress loaded");
        Ok(count)
    }

    /// Mark a page visited. Local only; call `save` to persist.
    pub fn record_visit(&self, page: &PageDescriptor, fallback_title: Option<&str>) -> VisitEntry {
        let now = self.clock.now();
        self.state().record(page, fallback_title, now).clone()
    }

    #[must_use]
    pub fn is_complete(&self, path: &str) -> bool {
        self.state().is_visited(path)
    }

    #[must_use]
    pub fn view(&self) -> ProgressView {
        ProgressView::from_state(&self.state())
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressState {
        self.state().clone()
    }

    fn save_request(
        &self,
        token: &str,
        page: &PageContext,
    ) -> Result<SaveProgressRequest, ProgressError> {
        let state = self.state();
        let blob = state
            .entries_json()
            .map_err(|e| ProgressError::Encode(e.to_string()))?;
        Ok(SaveProgressRequest {
            token: token.to_owned(),
            form_id: self.form_id.as_str().to_owned(),
            page_id: page.page_id,
            page_url: page.page_url.clone(),
            module_progress: Some(blob),
            last_visited_url: state.last_visited().map(|l| l.url.clone()),
            timestamp: Some(to_millis(self.clock.now())),
        })
    }

    /// Persist the full state, retrying transient failures with backoff.
    ///
    /// Returns the server's save time.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::RetriesExhausted` after the last attempt,
    /// `Rejected` when the server refuses the save, or `NoSession`/`Encode`.
    pub async fn save(&self, page: &PageContext) -> Result<DateTime<Utc>, ProgressError> {
        let token = self.context.token().await.ok_or(ProgressError::NoSession)?;
        let request = self.save_request(token.as_str(), page)?;
        let attempts = self.retry.max_attempts.max(1);
        let mut delays: Vec<Duration> = Vec::new();
        let mut attempt = 1;

        loop {
            let err = match self.api.save_progress(&request).await {
                Ok(reply) => {
                    debug!(token = %token, attempt, "progress saved");
                    return Ok(from_millis(reply.timestamp).unwrap_or_else(|| self.clock.now()));
                }
                Err(err) if err.is_transient() => err,
                Err(err) => {
                    self.clear_on_rejection(&err).await;
                    return Err(ProgressError::Rejected(err));
                }
            };

            if attempt >= attempts {
                warn!(token = %token, attempts, error = %err, "progress save gave up");
                return Err(ProgressError::RetriesExhausted {
                    attempts,
                    delays,
                    last: err,
                });
            }
            let delay = self.retry.delay_after(attempt);
            warn!(token = %token, attempt, ?delay, error = %err, "progress save failed, retrying");
            delays.push(delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One attempt, errors logged. For page unload.
    pub async fn flush(&self, page: &PageContext) {
        let Some(token) = self.context.token().await else {
            return;
        };
        let result = match self.save_request(token.as_str(), page) {
            Ok(request) => self.api.save_progress(&request).await.map(|_| ()),
            Err(err) => {
                warn!(error = %err, "progress flush could not encode state");
                return;
            }
        };
        if let Err(err) = result {
            warn!(token = %token, error = %err, "progress flush failed");
        }
    }

    /// Save every `interval` until the handle is aborted.
    #[must_use]
    pub fn spawn_autosave(&self, interval: Duration, page: PageContext) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = tracker.save(&page).await {
                    warn!(error = %err, "autosave failed");
                }
            }
        })
    }

    async fn clear_on_rejection(&self, err: &TransportError) {
        if err.is_token_rejection() {
            info!("server rejected the token, signing out");
            self.context.clear().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use survey_core::time::fixed_now;

    fn entry(path: &str, minutes: i64) -> (String, VisitEntry) {
        (
            path.to_owned(),
            VisitEntry {
                title: None,
                url: path.to_owned(),
                module_number: None,
                timestamp: fixed_now() + ChronoDuration::minutes(minutes),
                metadata: Default::default(),
                visited: true,
            },
        )
    }

    #[test]
    fn view_sorts_newest_first_and_keeps_path_order_on_ties() {
        let state = ProgressState::from_parts(
            [
                entry("/module-2/", 5),
                entry("/module-1/", 5),
                entry("/module-3/", 1),
                entry("/module-4/", 9),
            ]
            .into_iter()
            .collect(),
            None,
        );
        let view = ProgressView::from_state(&state);
        let urls: Vec<_> = view.entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/module-4/", "/module-1/", "/module-2/", "/module-3/"]);
        assert_eq!(view.last_visited.unwrap().url, "/module-4/");
        assert_eq!(view.completed_count, 4);
    }

    #[test]
    fn recent_is_capped() {
        let state = ProgressState::from_parts(
            (0..8).map(|n| entry(&format!("/module-{n}/"), n)).collect(),
            None,
        );
        let view = ProgressView::from_state(&state);
        assert_eq!(view.recent.len(), RECENT_LIMIT);
        assert_eq!(view.recent[0].url, "/module-7/");
    }
}
