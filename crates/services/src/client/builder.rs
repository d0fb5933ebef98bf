//! Assembles the participant-side components from a [`ClientConfig`].

use std::sync::Arc;

use survey_core::model::{FormId, FormIdError};
use survey_core::{Clock, ProtectedPaths};
use tokio::task::JoinHandle;
use tracing::info;

use super::config::ClientConfig;
use super::context::{AuthContext, CredentialCache};
use super::form::SurveyForm;
use super::gate::AccessGate;
use super::tracker::{PageContext, ProgressTracker};
use super::transport::{AjaxTransport, RestTransport, SurveyApi, VerifyTransport};
use super::verifier::TokenVerifier;

/// One participant session: the auth context plus the transport every
/// component talks through.
#[derive(Clone)]
pub struct SurveyClient {
    config: ClientConfig,
    form_id: FormId,
    context: AuthContext,
    api: Arc<dyn SurveyApi>,
    clock: Clock,
}

impl SurveyClient {
    /// Structured channel first, legacy `/ajax` as fallback, both at
    /// `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns `FormIdError` when `config.form_id` is not a valid form id.
    pub fn connect(config: ClientConfig, clock: Clock) -> Result<Self, FormIdError> {
        let rest = Arc::new(RestTransport::new(config.base_url.as_str()));
        let ajax = Arc::new(AjaxTransport::new(config.base_url.as_str()));
        let verify = vec![
            Arc::clone(&rest) as Arc<dyn VerifyTransport>,
            ajax as Arc<dyn VerifyTransport>,
        ];
        Self::with_transports(config, verify, rest, clock)
    }

    /// # Errors
    ///
    /// Returns `FormIdError` when `config.form_id` is not a valid form id.
    pub fn with_transports(
        config: ClientConfig,
        verify: Vec<Arc<dyn VerifyTransport>>,
        api: Arc<dyn SurveyApi>,
        clock: Clock,
    ) -> Result<Self, FormIdError> {
        let form_id = FormId::or_default(Some(config.form_id.as_str()))?;
        let cache = match &config.credential_file {
            Some(path) => {
                info!(path = %path.display(), "credentials persisted to file");
                CredentialCache::with_file(path, clock)
            }
            None => CredentialCache::in_memory(clock),
        };
        let verifier = TokenVerifier::new(verify, config.verify_timeout);
        Ok(Self {
            context: AuthContext::new(cache, verifier),
            form_id,
            api,
            clock,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    #[must_use]
    pub fn gate(&self, paths: ProtectedPaths) -> AccessGate {
        AccessGate::new(
            paths,
            self.context.clone(),
            Arc::clone(&self.api),
            self.config.home_url.as_str(),
        )
    }

    #[must_use]
    pub fn tracker(&self) -> ProgressTracker {
        ProgressTracker::new(
            self.context.clone(),
            Arc::clone(&self.api),
            self.form_id.clone(),
            self.config.retry,
            self.clock,
        )
    }

    #[must_use]
    pub fn form(&self, tracker: ProgressTracker, page: PageContext) -> SurveyForm {
        SurveyForm::new(self.context.clone(), Arc::clone(&self.api), tracker, page)
    }

    /// Periodic save at the configured autosave interval.
    #[must_use]
    pub fn spawn_autosave(&self, tracker: &ProgressTracker, page: PageContext) -> JoinHandle<()> {
        tracker.spawn_autosave(self.config.autosave_interval, page)
    }
}
