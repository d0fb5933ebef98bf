use std::sync::Arc;

use survey_core::ProtectedPaths;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::context::AuthContext;
use super::transport::SurveyApi;
use super::verifier::VerifiedSession;
use crate::error::VerifyError;

/// Where a page load stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unchecked,
    Checking,
    Granted,
    Denied,
}

/// What replaces the page content when access is denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPrompt {
    /// Markup from the login message endpoint.
    Server(String),
    /// The endpoint failed; render the local fallback with a link home.
    Fallback { home_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Public,
    Granted(VerifiedSession),
    Denied { prompt: LoginPrompt },
}

/// Guards one page load.
///
/// The first `check` decides; later calls return the same outcome.
pub struct AccessGate {
    paths: ProtectedPaths,
    context: AuthContext,
    api: Arc<dyn SurveyApi>,
    home_url: String,
    state: Mutex<(GateState, Option<GateOutcome>)>,
}

impl AccessGate {
    #[must_use]
    pub fn new(
        paths: ProtectedPaths,
        context: AuthContext,
        api: Arc<dyn SurveyApi>,
        home_url: impl Into<String>,
    ) -> Self {
        Self {
            paths,
            context,
            api,
            home_url: home_url.into(),
            state: Mutex::new((GateState::Unchecked, None)),
        }
    }

    pub async fn state(&self) -> GateState {
        self.state.lock().await.0
    }

    /// Decide whether `path` may render.
    pub async fn check(&self, path: &str) -> GateOutcome {
        let mut guard = self.state.lock().await;
        if let Some(outcome) = &guard.1 {
            return outcome.clone();
        }

        if !self.paths.is_protected(path) {
            debug!(path, "public page");
            guard.1 = Some(GateOutcome::Public);
            return GateOutcome::Public;
        }

        // Nothing to revalidate: Unchecked goes straight to Denied.
        let Some(credential) = self.context.credential().await else {
            info!(path, "protected page without credential");
            guard.0 = GateState::Denied;
            let outcome = GateOutcome::Denied {
                prompt: self.login_prompt().await,
            };
            guard.1 = Some(outcome.clone());
            return outcome;
        };

        guard.0 = GateState::Checking;
        let outcome = match self
            .context
            .verify(credential.token.as_str(), false)
            .await
        {
            Ok(session) => {
                guard.0 = GateState::Granted;
                GateOutcome::Granted(session)
            }
            Err(err) => {
                warn!(path, error = %err, "revalidation failed");
                if !matches!(err, VerifyError::InvalidFormat(_) | VerifyError::InvalidOrExpired) {
                    self.context.clear().await;
                }
                guard.0 = GateState::Denied;
                GateOutcome::Denied {
                    prompt: self.login_prompt().await,
                }
            }
        };
        guard.1 = Some(outcome.clone());
        outcome
    }

    async fn login_prompt(&self) -> LoginPrompt {
        match self.api.login_message().await {
            Ok(html) if !html.trim().is_empty() => LoginPrompt::Server(html),
            Ok(_) => LoginPrompt::Fallback {
                home_url: self.home_url.clone(),
            },
            Err(err) => {
                warn!(error = %err, "login message unavailable, using fallback");
                LoginPrompt::Fallback {
                    home_url: self.home_url.clone(),
                }
            }
        }
    }
}
