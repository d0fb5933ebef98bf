use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::to_millis;

static TOKEN_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][0-9]{4}$").expect("token format regex is valid"));

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TokenFormatError {
    #[error("token is required")]
    Empty,

    #[error("token must be one uppercase letter followed by four digits")]
    Malformed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TokenRecordError {
    #[error("expiry must be after creation time")]
    InvalidExpiry,

    #[error("invalid persisted token state: {0}")]
    InvalidPersistedState(String),
}

//
// ─── TOKEN ─────────────────────────────────────────────────────────────────────
//

/// A participant code: exactly one uppercase ASCII letter followed by four digits.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(String);

impl Token {
    /// Validates a candidate token. No normalisation is applied.
    ///
    /// # Errors
    ///
    /// Returns `TokenFormatError::Empty` for an empty candidate and
    /// `TokenFormatError::Malformed` for anything not matching `[A-Z][0-9]{4}`.
    pub fn parse(candidate: &str) -> Result<Self, TokenFormatError> {
        if candidate.is_empty() {
            return Err(TokenFormatError::Empty);
        }
        if !Self::is_valid_format(candidate) {
            return Err(TokenFormatError::Malformed);
        }
        Ok(Self(candidate.to_owned()))
    }

    #[must_use]
    pub fn is_valid_format(candidate: &str) -> bool {
        TOKEN_FORMAT.is_match(candidate)
    }

    /// Applies the entry-field formatting: trims, upper-cases, keeps a leading
    /// letter and only digits after it.
    ///
    /// The result still has to pass [`Token::parse`].
    #[must_use]
    pub fn normalize_input(raw: &str) -> String {
        let upper = raw.trim().to_uppercase();
        let mut chars = upper.chars();
        let mut out = String::with_capacity(5);
        if let Some(first) = chars.next() {
            if first.is_ascii_uppercase() {
                out.push(first);
            }
        }
        out.extend(chars.filter(char::is_ascii_digit));
        out
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Token {
    type Error = TokenFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Token> for String {
    fn from(value: Token) -> Self {
        value.0
    }
}

//
// ─── TOKEN RECORD ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    Used,
    Expired,
}

impl TokenStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            TokenStatus::Active => "Active",
            TokenStatus::Used => "Used",
            TokenStatus::Expired => "Expired",
        }
    }
}

/// Store-side state of an issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    token: Token,
    owner_name: Option<String>,
    group: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    used: bool,
    login_count: u32,
    last_used_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Issue a fresh, unused token.
    ///
    /// # Errors
    ///
    /// Returns `TokenRecordError::InvalidExpiry` if `expires_at <= created_at`.
    pub fn new(
        token: Token,
        owner_name: Option<String>,
        group: Option<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, TokenRecordError> {
        if expires_at <= created_at {
            return Err(TokenRecordError::InvalidExpiry);
        }
        Ok(Self {
            token,
            owner_name: normalize_optional(owner_name),
            group: normalize_optional(group),
            created_at,
            expires_at,
            used: false,
            login_count: 0,
            last_used_at: None,
        })
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `TokenRecordError::InvalidPersistedState` if `last_used_at` predates creation.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        token: Token,
        owner_name: Option<String>,
        group: Option<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        used: bool,
        login_count: u32,
        last_used_at: Option<DateTime<Utc>>,
    ) -> Result<Self, TokenRecordError> {
        if let Some(last) = last_used_at {
            if last < created_at {
                return Err(TokenRecordError::InvalidPersistedState(
                    "last_used_at before created_at".into(),
                ));
            }
        }
        Ok(Self {
            token,
            owner_name: normalize_optional(owner_name),
            group: normalize_optional(group),
            created_at,
            expires_at,
            used,
            login_count,
            last_used_at,
        })
    }

    #[must_use]
    pub fn token(&self) -> &Token {
        &self.token
    }

    #[must_use]
    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.as_deref()
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used
    }

    #[must_use]
    pub fn login_count(&self) -> u32 {
        self.login_count
    }

    #[must_use]
    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    /// Expiry as Unix milliseconds.
    #[must_use]
    pub fn expiry_millis(&self) -> i64 {
        to_millis(self.expires_at)
    }

    /// A token may establish a session iff `now < expires_at` and it is not used.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && !self.used
    }

    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> TokenStatus {
        if self.used {
            TokenStatus::Used
        } else if now >= self.expires_at {
            TokenStatus::Expired
        } else {
            TokenStatus::Active
        }
    }

    /// Count an initial login.
    pub fn record_login(&mut self, now: DateTime<Utc>) {
        self.login_count = self.login_count.saturating_add(1);
        self.last_used_at = Some(now);
    }

    /// Deactivate the token.
    pub fn mark_used(&mut self, now: DateTime<Utc>) {
        self.used = true;
        self.last_used_at = Some(now);
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

//
// ─── SESSION CREDENTIAL ────────────────────────────────────────────────────────
//

/// Client-held proof of a verified token: the token plus its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub token: Token,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionCredential {
    #[must_use]
    pub fn new(token: Token, expires_at: DateTime<Utc>) -> Self {
        Self { token, expires_at }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn record(expires_in: Duration) -> TokenRecord {
        let now = fixed_now();
        TokenRecord::new(
            Token::parse("B7788").unwrap(),
            Some(" Pat ".into()),
            Some("control".into()),
            now - Duration::days(1),
            now + expires_in,
        )
        .unwrap()
    }

    #[test]
    fn format_accepts_letter_and_four_digits() {
        assert!(Token::is_valid_format("A1234"));
        assert!(Token::is_valid_format("Z0000"));
    }

    #[test]
    fn format_rejects_near_misses() {
        for bad in ["a1234", "AB123", "A123", "A12345", "", " A1234", "A1234 ", "É1234", "A12٣4"] {
            assert!(!Token::is_valid_format(bad), "{bad:?} should be rejected");
        }
        assert_eq!(Token::parse("").unwrap_err(), TokenFormatError::Empty);
        assert_eq!(Token::parse("AB123").unwrap_err(), TokenFormatError::Malformed);
    }

    #[test]
    fn normalize_input_formats_entry_text() {
        assert_eq!(Token::normalize_input(" a1234 "), "A1234");
        assert_eq!(Token::normalize_input("ab-12x34"), "A1234");
        assert_eq!(Token::normalize_input("1234"), "234");
        assert!(Token::parse(&Token::normalize_input("a1234")).is_ok());
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let now = fixed_now();
        let rec = record(Duration::zero());
        assert_eq!(rec.expires_at(), now);
        assert!(!rec.is_valid_at(now));
        assert!(rec.is_valid_at(now - Duration::milliseconds(1)));
        assert_eq!(rec.status_at(now), TokenStatus::Expired);
    }

    #[test]
    fn used_token_is_invalid_and_reports_used() {
        let now = fixed_now();
        let mut rec = record(Duration::days(30));
        assert!(rec.is_valid_at(now));
        rec.mark_used(now);
        assert!(!rec.is_valid_at(now));
        assert_eq!(rec.status_at(now + Duration::days(60)), TokenStatus::Used);
    }

    #[test]
    fn record_login_increments_and_stamps() {
        let now = fixed_now();
        let mut rec = record(Duration::days(30));
        rec.record_login(now);
        assert_eq!(rec.login_count(), 1);
        assert_eq!(rec.last_used_at(), Some(now));
        assert_eq!(rec.owner_name(), Some("Pat"));
    }

    #[test]
    fn new_rejects_expiry_before_creation() {
        let now = fixed_now();
        let err = TokenRecord::new(Token::parse("A0001").unwrap(), None, None, now, now).unwrap_err();
        assert_eq!(err, TokenRecordError::InvalidExpiry);
    }

    #[test]
    fn credential_serializes_expiry_as_millis() {
        let cred = SessionCredential::new(Token::parse("C0001").unwrap(), fixed_now());
        let json = serde_json::to_value(&cred).unwrap();
        assert_eq!(json["token"], "C0001");
        assert_eq!(json["expires_at"], 1_700_000_000_000_i64);
        assert!(cred.is_expired_at(fixed_now()));
    }
}
