use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::AuthorityError;
use services::wire::{Legacy, Structured};
use survey_core::ErrorCode;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error(transparent)]
    Authority(#[from] AuthorityError),
    #[error("This endpoint is disabled")]
    ChannelDisabled,
    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

impl ApiError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Authority(err) => err.code(),
            ApiError::ChannelDisabled => ErrorCode::ChannelDisabled,
            ApiError::UnknownAction(_) => ErrorCode::MissingField,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::TokenRequired | ErrorCode::InvalidFormat | ErrorCode::MissingField => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorCode::NoAnswersSaved => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ChannelDisabled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            ApiError::Authority(err) => err.public_message(),
            other => other.to_string(),
        }
    }

    fn log(&self) {
        if self.code() == ErrorCode::ServerError {
            error!(error = %self, "request failed");
        } else {
            debug!(code = %self.code(), "request rejected");
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = Structured::error(self.code(), self.message());
        (self.status(), Json(body)).into_response()
    }
}

/// Error in the legacy envelope: always 200 except for server errors.
#[derive(Debug)]
pub struct LegacyError(pub ApiError);

impl From<ApiError> for LegacyError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for LegacyError {
    fn into_response(self) -> Response {
        let err = self.0;
        err.log();
        let status = if err.code() == ErrorCode::ServerError {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        (status, Json(Legacy::error(err.code(), err.message()))).into_response()
    }
}
