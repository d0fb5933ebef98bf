//! Request and reply bodies shared by the HTTP surface and the client transports.
//!
//! The structured channel carries these as JSON. The legacy channel carries the
//! same request fields form-encoded and wraps replies as `{success, data}`.

use serde::{Deserialize, Serialize};
use survey_core::ErrorCode;
use survey_core::model::{AnswerSet, ResponseView};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: String,
    #[serde(rename = "isInitialLogin", default, deserialize_with = "lenient_bool")]
    pub is_initial_login: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReply {
    pub message: String,
    #[serde(default)]
    pub study_group: Option<String>,
    /// Expiry as Unix milliseconds.
    pub expiry: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveProgressRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub form_id: String,
    #[serde(default)]
    pub page_id: Option<u64>,
    #[serde(default)]
    pub page_url: String,
    /// JSON text of the visit map.
    #[serde(default)]
    pub module_progress: Option<String>,
    #[serde(default)]
    pub last_visited_url: Option<String>,
    /// Client time of the save, Unix milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveProgressReply {
    pub message: String,
    /// Server time of the save, Unix milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadProgressRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub form_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Always valid JSON text; `"{}"` when nothing usable is stored.
    pub module_progress: String,
    pub current_page_id: Option<u64>,
    pub current_page_url: Option<String>,
    pub last_visited_url: Option<String>,
    pub last_visited_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadProgressReply {
    pub progress: ProgressPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub form_id: Option<String>,
    #[serde(default)]
    pub answers: AnswerSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReply {
    pub message: String,
    pub saved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsesReply {
    pub responses: Vec<ResponseView>,
}

/// Envelope of the structured channel: the payload fields sit next to `success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structured<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

/// Envelope of the legacy channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Legacy<T> {
    pub success: bool,
    pub data: T,
}

impl<T> Structured<T> {
    pub fn ok(body: T) -> Self {
        Self {
            success: true,
            body,
        }
    }
}

impl<T> Legacy<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl Structured<ErrorReply> {
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            body: ErrorReply {
                code,
                message: message.into(),
            },
        }
    }
}

impl Legacy<ErrorReply> {
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: ErrorReply {
                code,
                message: message.into(),
            },
        }
    }
}

/// Accepts `true`/`false`, `1`/`0` and their string forms.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Int(n) => n != 0,
        Raw::Text(s) => matches!(s.trim(), "1" | "true" | "TRUE" | "True"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_request_accepts_loose_flags() {
        let json: VerifyRequest =
            serde_json::from_str(r#"{"token":"A1234","isInitialLogin":true}"#).unwrap();
        assert!(json.is_initial_login);
        let text: VerifyRequest =
            serde_json::from_str(r#"{"token":"A1234","isInitialLogin":"1"}"#).unwrap();
        assert!(text.is_initial_login);
        let missing: VerifyRequest = serde_json::from_str(r#"{"token":"A1234"}"#).unwrap();
        assert!(!missing.is_initial_login);
    }

    #[test]
    fn structured_reply_flattens_body() {
        let reply = Structured::ok(VerifyReply {
            message: "ID verified successfully".into(),
            study_group: Some("control".into()),
            expiry: 1_700_000_000_000,
        });
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["study_group"], "control");
        assert_eq!(value["expiry"], 1_700_000_000_000_i64);
    }

    #[test]
    fn legacy_error_nests_code_in_data() {
        let value =
            serde_json::to_value(Legacy::error(ErrorCode::InvalidToken, "Invalid or expired ID"))
                .unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["data"]["code"], "invalid_token");
    }
}
