//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use survey_core::ErrorCode;
use survey_core::model::{AnswerError, FormIdError, TokenFormatError, TokenRecordError};

pub const MSG_TOKEN_REQUIRED: &str = "Please enter your ID";
pub const MSG_INVALID_FORMAT: &str =
    "Please enter one letter followed by four numbers (e.g., A1234)";
pub const MSG_INVALID_TOKEN: &str = "Invalid or expired ID";
pub const MSG_VERIFY_UNAVAILABLE: &str = "Error verifying ID. Please try again later.";

/// Errors emitted by the server-side authority services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthorityError {
    #[error("ID is required")]
    TokenRequired,
    #[error(transparent)]
    InvalidFormat(#[from] TokenFormatError),
    #[error("Invalid or expired ID")]
    InvalidOrExpired,
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("No responses were saved")]
    NoAnswersSaved,
    #[error(transparent)]
    FormId(#[from] FormIdError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    TokenRecord(#[from] TokenRecordError),
    #[error("token already exists")]
    DuplicateToken,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthorityError {
    /// Wire code reported to clients.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthorityError::TokenRequired => ErrorCode::TokenRequired,
            AuthorityError::InvalidFormat(TokenFormatError::Empty) => ErrorCode::TokenRequired,
            AuthorityError::InvalidFormat(_) => ErrorCode::InvalidFormat,
            AuthorityError::InvalidOrExpired => ErrorCode::InvalidToken,
            AuthorityError::MissingField(_)
            | AuthorityError::FormId(_)
            | AuthorityError::Answer(_) => ErrorCode::MissingField,
            AuthorityError::NoAnswersSaved => ErrorCode::NoAnswersSaved,
            AuthorityError::TokenRecord(_)
            | AuthorityError::DuplicateToken
            | AuthorityError::Storage(_) => ErrorCode::ServerError,
        }
    }

    /// Message safe to show to a participant; storage detail stays in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            AuthorityError::Storage(_) => "An error occurred. Please try again.".to_owned(),
            AuthorityError::InvalidFormat(TokenFormatError::Empty) => "ID is required".to_owned(),
            other => other.to_string(),
        }
    }
}

/// Errors emitted by client transports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server returned status {status}")]
    Status { status: u16 },
    #[error("malformed reply: {0}")]
    Malformed(String),
    /// The server answered with an error code.
    #[error("{code}: {message}")]
    Rejected { code: ErrorCode, message: String },
}

impl TransportError {
    /// Transient failures worth retrying or falling back from.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout => true,
            TransportError::Status { status } => *status >= 500,
            TransportError::Malformed(_) => false,
            TransportError::Rejected { code, .. } => {
                matches!(code, ErrorCode::ServerError | ErrorCode::ChannelDisabled)
            }
        }
    }

    /// True when the server made a definitive statement about the token.
    #[must_use]
    pub fn is_token_rejection(&self) -> bool {
        matches!(self, TransportError::Rejected { code, .. } if code.is_token_rejection())
    }

    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            TransportError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Malformed(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Errors emitted by `TokenVerifier`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerifyError {
    #[error(transparent)]
    InvalidFormat(#[from] TokenFormatError),
    #[error("token is invalid or expired")]
    InvalidOrExpired,
    #[error("server error during verification")]
    ServerError,
    #[error("all verification transports failed")]
    TransportFailure,
    #[error("verification timed out")]
    Timeout,
}

impl VerifyError {
    /// Text shown next to the entry field.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            VerifyError::InvalidFormat(TokenFormatError::Empty) => MSG_TOKEN_REQUIRED,
            VerifyError::InvalidFormat(_) => MSG_INVALID_FORMAT,
            VerifyError::InvalidOrExpired => MSG_INVALID_TOKEN,
            VerifyError::ServerError | VerifyError::TransportFailure | VerifyError::Timeout => {
                MSG_VERIFY_UNAVAILABLE
            }
        }
    }
}

/// Errors emitted by `ProgressTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        delays: Vec<Duration>,
        last: TransportError,
    },
    #[error("progress save rejected: {0}")]
    Rejected(TransportError),
    #[error("progress could not be loaded: {0}")]
    Load(TransportError),
    #[error("no verified session")]
    NoSession,
    #[error("progress could not be encoded: {0}")]
    Encode(String),
}

/// Errors emitted by `SurveyForm`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("ID is required")]
    TokenRequired,
    #[error("Invalid or expired ID")]
    InvalidOrExpiredToken,
    #[error("No responses were saved")]
    NoAnswersSaved,
    #[error("a submission is already in flight")]
    InFlight,
    #[error("survey already submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Transport(TransportError),
}

impl SubmissionError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Transport(_) => {
                "Error submitting survey. Please try again.".to_owned()
            }
            other => other.to_string(),
        }
    }
}

impl From<TransportError> for SubmissionError {
    fn from(err: TransportError) -> Self {
        match err.code() {
            Some(ErrorCode::InvalidToken | ErrorCode::InvalidFormat) => {
                SubmissionError::InvalidOrExpiredToken
            }
            Some(ErrorCode::TokenRequired) => SubmissionError::TokenRequired,
            Some(ErrorCode::NoAnswersSaved) => SubmissionError::NoAnswersSaved,
            _ => SubmissionError::Transport(err),
        }
    }
}

/// Errors emitted while bootstrapping services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BootstrapError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_network_and_server_side() {
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::Status { status: 500 }.is_transient());
        assert!(TransportError::Status { status: 503 }.is_transient());
        assert!(!TransportError::Status { status: 404 }.is_transient());
        let rejected = TransportError::Rejected {
            code: ErrorCode::InvalidToken,
            message: "Invalid or expired ID".into(),
        };
        assert!(!rejected.is_transient());
        assert!(rejected.is_token_rejection());
    }

    #[test]
    fn verify_errors_map_to_entry_messages() {
        assert_eq!(
            VerifyError::InvalidFormat(TokenFormatError::Empty).user_message(),
            "Please enter your ID"
        );
        assert_eq!(
            VerifyError::InvalidFormat(TokenFormatError::Malformed).user_message(),
            "Please enter one letter followed by four numbers (e.g., A1234)"
        );
        assert_eq!(VerifyError::Timeout.user_message(), MSG_VERIFY_UNAVAILABLE);
        assert_eq!(VerifyError::TransportFailure.user_message(), MSG_VERIFY_UNAVAILABLE);
    }

    #[test]
    fn rejected_submit_maps_to_submission_error() {
        let err = SubmissionError::from(TransportError::Rejected {
            code: ErrorCode::InvalidToken,
            message: "Invalid or expired ID".into(),
        });
        assert!(matches!(err, SubmissionError::InvalidOrExpiredToken));
        let err = SubmissionError::from(TransportError::Status { status: 502 });
        assert!(matches!(err, SubmissionError::Transport(_)));
    }
}
