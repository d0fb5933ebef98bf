use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use survey_core::model::{AnswerSet, PageDescriptor};
use tracing::{info, warn};

use super::context::AuthContext;
use super::tracker::{PageContext, ProgressTracker};
use super::transport::SurveyApi;
use crate::error::{ProgressError, SubmissionError};
use crate::wire::{SubmitReply, SubmitRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Ready,
    Submitting,
    Submitted,
    /// Submit is enabled again; `message` is shown inline.
    Failed { message: String },
}

impl FormState {
    #[must_use]
    pub fn can_submit(&self) -> bool {
        matches!(self, FormState::Ready | FormState::Failed { .. })
    }
}

/// A stored submission and the save of its page as completed.
///
/// The answers are stored even when `progress` is an error.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub reply: SubmitReply,
    pub progress: Result<DateTime<Utc>, ProgressError>,
}

/// Client side of one survey form on one page.
pub struct SurveyForm {
    context: AuthContext,
    api: Arc<dyn SurveyApi>,
    tracker: ProgressTracker,
    page: PageContext,
    state: Mutex<FormState>,
}

impl SurveyForm {
    /// Answers go to the tracker's form.
    #[must_use]
    pub fn new(
        context: AuthContext,
        api: Arc<dyn SurveyApi>,
        tracker: ProgressTracker,
        page: PageContext,
    ) -> Self {
        Self {
            context,
            api,
            tracker,
            page,
            state: Mutex::new(FormState::Ready),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FormState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> FormState {
        self.lock().clone()
    }

    /// Send the answers, then record and save the page as completed.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::InFlight`/`AlreadySubmitted` when the form is
    /// not ready, `TokenRequired` without a credential, or the server's
    /// rejection. A rejected token also clears the stored credential. A
    /// failed progress save is reported in [`SubmitOutcome::progress`].
    pub async fn submit(&self, answers: &AnswerSet) -> Result<SubmitOutcome, SubmissionError> {
        {
            let mut state = self.lock();
            match *state {
                FormState::Submitting => return Err(SubmissionError::InFlight),
                FormState::Submitted => return Err(SubmissionError::AlreadySubmitted),
                FormState::Ready | FormState::Failed { .. } => *state = FormState::Submitting,
            }
        }

        match self.send(answers).await {
            Ok(reply) => {
                *self.lock() = FormState::Submitted;
                info!(form_id = %self.tracker.form_id(), saved = reply.saved, "survey submitted");
                let progress = self.mark_page_complete().await;
                Ok(SubmitOutcome { reply, progress })
            }
            Err(err) => {
                if matches!(err, SubmissionError::InvalidOrExpiredToken) {
                    self.context.clear().await;
                }
                warn!(form_id = %self.tracker.form_id(), error = %err, "survey submission failed");
                *self.lock() = FormState::Failed {
                    message: err.user_message(),
                };
                Err(err)
            }
        }
    }

    async fn send(&self, answers: &AnswerSet) -> Result<SubmitReply, SubmissionError> {
        let token = self
            .context
            .token()
            .await
            .ok_or(SubmissionError::TokenRequired)?;
        let request = SubmitRequest {
            token: token.as_str().to_owned(),
            form_id: Some(self.tracker.form_id().as_str().to_owned()),
            answers: answers.clone(),
        };
        Ok(self.api.submit(&request).await?)
    }

    async fn mark_page_complete(&self) -> Result<DateTime<Utc>, ProgressError> {
        let mut page = PageDescriptor::new(self.page.page_url.as_str());
        if let Some(title) = &self.page.page_title {
            page = page.with_title(title.as_str());
        }
        self.tracker.record_visit(&page, None);
        let saved = self.tracker.save(&self.page).await;
        if let Err(err) = &saved {
            warn!(error = %err, "progress save after submission failed");
        }
        saved
    }
}
