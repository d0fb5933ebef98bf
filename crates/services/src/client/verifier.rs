use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use survey_core::ErrorCode;
use survey_core::model::{SessionCredential, Token};
use survey_core::time::from_millis;
use tracing::{debug, warn};

use super::transport::VerifyTransport;
use crate::error::{TransportError, VerifyError};
use crate::wire::VerifyReply;

/// A token the server accepted, with what it said about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    pub token: Token,
    pub group: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl VerifiedSession {
    #[must_use]
    pub fn credential(&self) -> SessionCredential {
        SessionCredential::new(self.token.clone(), self.expires_at)
    }
}

/// The server's decision, from whichever transport reached it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyAnswer {
    Accepted(VerifyReply),
    Rejected { code: ErrorCode, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub via: &'static str,
    pub error: TransportError,
}

/// Result of walking the transport list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    Answered {
        via: &'static str,
        answer: VerifyAnswer,
    },
    Exhausted {
        failures: Vec<TransportFailure>,
    },
}

/// Checks tokens against the server, falling back across transports.
#[derive(Clone)]
pub struct TokenVerifier {
    transports: Vec<Arc<dyn VerifyTransport>>,
    timeout: Duration,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(transports: Vec<Arc<dyn VerifyTransport>>, timeout: Duration) -> Self {
        Self {
            transports,
            timeout,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Try each transport in order until one gets an answer.
    ///
    /// A rejection naming the token ends the walk; transient failures and
    /// unusable replies move on to the next transport.
    pub async fn query(&self, token: &Token, is_initial_login: bool) -> TransportOutcome {
        let mut failures = Vec::new();
        for transport in &self.transports {
            let via = transport.name();
            match transport.verify(token, is_initial_login).await {
                Ok(reply) => {
                    return TransportOutcome::Answered {
                        via,
                        answer: VerifyAnswer::Accepted(reply),
                    };
                }
                Err(TransportError::Rejected { code, message }) if !is_fallback_code(code) => {
                    return TransportOutcome::Answered {
                        via,
                        answer: VerifyAnswer::Rejected { code, message },
                    };
                }
                Err(error) => {
                    warn!(transport = via, error = %error, "verify transport failed");
                    failures.push(TransportFailure { via, error });
                }
            }
        }
        TransportOutcome::Exhausted { failures }
    }

    /// Verify a candidate token.
    ///
    /// The format check runs locally first. All transports share one timeout.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::InvalidFormat` without any network call,
    /// `InvalidOrExpired` when the server rejects the token, `ServerError` for
    /// other server-side rejections, `TransportFailure` when every transport
    /// failed, or `Timeout` when the budget ran out.
    pub async fn verify(
        &self,
        candidate: &str,
        is_initial_login: bool,
    ) -> Result<VerifiedSession, VerifyError> {
        let token = Token::parse(candidate.trim())?;
        let outcome = tokio::time::timeout(self.timeout, self.query(&token, is_initial_login))
            .await
            .map_err(|_| {
                warn!(token = %token, "verification timed out");
                VerifyError::Timeout
            })?;

        match outcome {
            TransportOutcome::Answered {
                via,
                answer: VerifyAnswer::Accepted(reply),
            } => {
                debug!(token = %token, transport = via, "token verified");
                let expires_at = from_millis(reply.expiry).ok_or(VerifyError::ServerError)?;
                Ok(VerifiedSession {
                    token,
                    group: reply.study_group,
                    expires_at,
                })
            }
            TransportOutcome::Answered {
                answer: VerifyAnswer::Rejected { code, .. },
                ..
            } if code.is_token_rejection() => Err(VerifyError::InvalidOrExpired),
            TransportOutcome::Answered { .. } => Err(VerifyError::ServerError),
            TransportOutcome::Exhausted { .. } => Err(VerifyError::TransportFailure),
        }
    }
}

/// Codes that mean "this channel could not decide", not "this token is bad".
fn is_fallback_code(code: ErrorCode) -> bool {
    matches!(code, ErrorCode::ServerError | ErrorCode::ChannelDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        reply: Result<VerifyReply, TransportError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, reply: Result<VerifyReply, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VerifyTransport for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn verify(&self, _: &Token, _: bool) -> Result<VerifyReply, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn accepted() -> VerifyReply {
        VerifyReply {
            message: "ID verified successfully".into(),
            study_group: Some("control".into()),
            expiry: 1_800_000_000_000,
        }
    }

    fn invalid() -> TransportError {
        TransportError::Rejected {
            code: ErrorCode::InvalidToken,
            message: "Invalid or expired ID".into(),
        }
    }

    #[tokio::test]
    async fn malformed_token_never_reaches_a_transport() {
        let rest = Scripted::new("rest", Ok(accepted()));
        let verifier = TokenVerifier::new(vec![rest.clone()], Duration::from_secs(1));
        assert!(matches!(
            verifier.verify("12345", true).await,
            Err(VerifyError::InvalidFormat(_))
        ));
        assert!(matches!(
            verifier.verify("", true).await,
            Err(VerifyError::InvalidFormat(_))
        ));
        assert_eq!(rest.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_falls_back_to_next_transport() {
        let rest = Scripted::new("rest", Err(TransportError::Status { status: 503 }));
        let ajax = Scripted::new("ajax", Ok(accepted()));
        let verifier = TokenVerifier::new(vec![rest.clone(), ajax.clone()], Duration::from_secs(1));

        let token = Token::parse("B7788").unwrap();
        let outcome = verifier.query(&token, false).await;
        assert!(matches!(outcome, TransportOutcome::Answered { via: "ajax", .. }));

        let session = verifier.verify("B7788", false).await.unwrap();
        assert_eq!(session.group.as_deref(), Some("control"));
        assert_eq!(session.expires_at.timestamp_millis(), 1_800_000_000_000);
    }

    #[tokio::test]
    async fn authoritative_rejection_ends_the_chain() {
        let rest = Scripted::new("rest", Err(invalid()));
        let ajax = Scripted::new("ajax", Ok(accepted()));
        let verifier = TokenVerifier::new(vec![rest, ajax.clone()], Duration::from_secs(1));
        assert!(matches!(
            verifier.verify("A1234", false).await,
            Err(VerifyError::InvalidOrExpired)
        ));
        assert_eq!(ajax.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhaustion_reports_every_failure() {
        let rest = Scripted::new("rest", Err(TransportError::Network("refused".into())));
        let ajax = Scripted::new("ajax", Err(TransportError::Malformed("html".into())));
        let verifier = TokenVerifier::new(vec![rest, ajax], Duration::from_secs(1));

        let token = Token::parse("A1234").unwrap();
        let TransportOutcome::Exhausted { failures } = verifier.query(&token, false).await else {
            panic!("expected exhaustion");
        };
        let names: Vec<_> = failures.iter().map(|f| f.via).collect();
        assert_eq!(names, vec!["rest", "ajax"]);
        assert!(matches!(
            verifier.verify("A1234", false).await,
            Err(VerifyError::TransportFailure)
        ));
    }

    struct Stalled;

    #[async_trait]
    impl VerifyTransport for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn verify(&self, _: &Token, _: bool) -> Result<VerifyReply, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(accepted())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shared_budget_times_out() {
        let verifier = TokenVerifier::new(vec![Arc::new(Stalled)], Duration::from_secs(10));
        assert!(matches!(
            verifier.verify("A1234", false).await,
            Err(VerifyError::Timeout)
        ));
    }
}
