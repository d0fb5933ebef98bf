//! Participant-side session handling: verification, gating, progress and forms.

pub mod builder;
pub mod config;
pub mod context;
pub mod form;
pub mod gate;
pub mod tracker;
pub mod transport;
pub mod verifier;

pub use builder::SurveyClient;
pub use config::{ClientConfig, RetryPolicy};
pub use context::{AuthContext, AuthEvent, CredentialCache};
pub use form::{FormState, SubmitOutcome, SurveyForm};
pub use gate::{AccessGate, GateOutcome, GateState, LoginPrompt};
pub use tracker::{PageContext, ProgressTracker, ProgressView};
pub use transport::{AjaxTransport, LocalTransport, RestTransport, SurveyApi, VerifyTransport};
pub use verifier::{TokenVerifier, TransportOutcome, VerifiedSession, VerifyAnswer};
