use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable failure codes shared by the server replies and the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    TokenRequired,
    InvalidFormat,
    InvalidToken,
    MissingField,
    NoAnswersSaved,
    ServerError,
    ChannelDisabled,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::TokenRequired => "token_required",
            ErrorCode::InvalidFormat => "invalid_format",
            ErrorCode::InvalidToken => "invalid_token",
            ErrorCode::MissingField => "missing_field",
            ErrorCode::NoAnswersSaved => "no_answers_saved",
            ErrorCode::ServerError => "server_error",
            ErrorCode::ChannelDisabled => "channel_disabled",
        }
    }

    /// True for codes that are an authoritative answer about the token itself.
    #[must_use]
    pub fn is_token_rejection(self) -> bool {
        matches!(self, ErrorCode::InvalidToken | ErrorCode::InvalidFormat)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
