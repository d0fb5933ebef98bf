use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of an authored survey question.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(u64);

impl QuestionId {
    /// Creates a new `QuestionId`
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying u64 value
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuestionId({})", self.0)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for parsing ID from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

impl FromStr for QuestionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(QuestionId::new)
            .map_err(|_| ParseIdError {
                kind: "QuestionId".to_string(),
            })
    }
}

// ─── Form identifier ───────────────────────────────────────────────────────────

pub const DEFAULT_FORM_ID: &str = "default";
pub const MAX_FORM_ID_LEN: usize = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormIdError {
    #[error("form id cannot be empty")]
    Empty,

    #[error("form id is longer than {max} characters")]
    TooLong { max: usize },
}

/// Name of one survey instance. Progress and responses are partitioned by it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormId(String);

impl FormId {
    /// Validates and trims a form identifier.
    ///
    /// # Errors
    ///
    /// Returns `FormIdError` if the id is blank or longer than 50 characters.
    pub fn new(raw: impl Into<String>) -> Result<Self, FormIdError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(FormIdError::Empty);
        }
        if trimmed.chars().count() > MAX_FORM_ID_LEN {
            return Err(FormIdError::TooLong {
                max: MAX_FORM_ID_LEN,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Uses the given id, or the `default` form when it is missing or blank.
    ///
    /// # Errors
    ///
    /// Returns `FormIdError::TooLong` when a non-blank id is too long.
    pub fn or_default(raw: Option<&str>) -> Result<Self, FormIdError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => Self::new(id),
            None => Ok(Self::default()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FormId {
    fn default() -> Self {
        Self(DEFAULT_FORM_ID.to_owned())
    }
}

impl fmt::Debug for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormId({})", self.0)
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FormId {
    type Error = FormIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FormId> for String {
    fn from(value: FormId) -> Self {
        value.0
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_id_from_str() {
        let id: QuestionId = " 123 ".parse().unwrap();
        assert_eq!(id, QuestionId::new(123));
        assert_eq!(id.to_string(), "123");
    }

    #[test]
    fn test_question_id_from_str_invalid() {
        assert!("q_12".parse::<QuestionId>().is_err());
    }

    #[test]
    fn form_id_defaults_when_blank() {
        assert_eq!(FormId::or_default(None).unwrap().as_str(), "default");
        assert_eq!(FormId::or_default(Some("  ")).unwrap().as_str(), "default");
        assert_eq!(FormId::or_default(Some(" intake ")).unwrap().as_str(), "intake");
    }

    #[test]
    fn form_id_rejects_long_values() {
        let long = "x".repeat(51);
        assert_eq!(
            FormId::new(long).unwrap_err(),
            FormIdError::TooLong { max: 50 }
        );
        assert_eq!(FormId::new("").unwrap_err(), FormIdError::Empty);
    }

    #[test]
    fn form_id_deserialize_validates() {
        let ok: FormId = serde_json::from_str("\"week-1\"").unwrap();
        assert_eq!(ok.as_str(), "week-1");
        assert!(serde_json::from_str::<FormId>("\"\"").is_err());
    }
}
