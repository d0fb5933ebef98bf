use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use storage::repository::{StorageError, TokenRepository, TokenStats};
use survey_core::model::{Token, TokenRecord};
use tracing::{debug, info};

use crate::Clock;
use crate::error::AuthorityError;

/// What a successful verification tells the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: Token,
    pub group: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Decides whether a token may establish a session.
///
/// Every channel that verifies tokens goes through [`TokenAuthority::verify`],
/// so the login-count rule is the same everywhere.
#[derive(Clone)]
pub struct TokenAuthority {
    clock: Clock,
    tokens: Arc<dyn TokenRepository>,
}

/// Trims and validates a raw token field.
///
/// # Errors
///
/// Returns `AuthorityError::TokenRequired` for a missing or blank value and
/// `AuthorityError::InvalidFormat` when it does not match `[A-Z][0-9]{4}`.
pub fn parse_token_field(raw: Option<&str>) -> Result<Token, AuthorityError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(AuthorityError::TokenRequired);
    }
    Ok(Token::parse(raw)?)
}

impl TokenAuthority {
    #[must_use]
    pub fn new(clock: Clock, tokens: Arc<dyn TokenRepository>) -> Self {
        Self { clock, tokens }
    }

    /// Verify a token at the current time.
    ///
    /// When `is_initial_login` is true the login count is incremented and the
    /// last-used time stamped; revalidation leaves the record untouched.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::TokenRequired` or `InvalidFormat` before any
    /// storage access, `InvalidOrExpired` when no valid record exists, or
    /// `Storage` if the repository fails.
    pub async fn verify(
        &self,
        raw: Option<&str>,
        is_initial_login: bool,
    ) -> Result<TokenGrant, AuthorityError> {
        let token = parse_token_field(raw)?;
        let now = self.clock.now();
        let record = self
            .tokens
            .find_valid_token(&token, now)
            .await?
            .ok_or_else(|| {
                debug!(token = %token, "token rejected");
                AuthorityError::InvalidOrExpired
            })?;

        if is_initial_login {
            self.tokens.record_login(&token, now).await?;
            info!(token = %token, "initial login recorded");
        }

        Ok(TokenGrant {
            token,
            group: record.group().map(str::to_owned),
            expires_at: record.expires_at(),
        })
    }

    /// Check validity without side effects.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::Storage` if the repository fails.
    pub async fn is_valid(&self, token: &Token) -> Result<bool, AuthorityError> {
        let now = self.clock.now();
        Ok(self.tokens.find_valid_token(token, now).await?.is_some())
    }

    /// Issue a new token valid for `expiry_days` from now.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::DuplicateToken` if the token exists,
    /// `TokenRecord` for a non-positive lifetime, or `Storage`.
    pub async fn issue(
        &self,
        token: Token,
        owner_name: Option<String>,
        group: Option<String>,
        expiry_days: u32,
    ) -> Result<TokenRecord, AuthorityError> {
        let now = self.clock.now();
        let expires_at = now + Duration::days(i64::from(expiry_days));
        let record = TokenRecord::new(token, owner_name, group, now, expires_at)?;
        match self.tokens.insert_token(&record).await {
            Ok(()) => {
                info!(token = %record.token(), expires_at = %expires_at, "token issued");
                Ok(record)
            }
            Err(StorageError::Conflict) => Err(AuthorityError::DuplicateToken),
            Err(err) => Err(err.into()),
        }
    }

    /// Mark a token used so it can no longer log in.
    ///
    /// # Errors
    ///
    /// Returns `AuthorityError::InvalidOrExpired` if the token is unknown, or `Storage`.
    pub async fn deactivate(&self, token: &Token) -> Result<(), AuthorityError> {
        match self.tokens.mark_token_used(token, self.clock.now()).await {
            Ok(()) => {
                info!(token = %token, "token deactivated");
                Ok(())
            }
            Err(StorageError::NotFound) => Err(AuthorityError::InvalidOrExpired),
            Err(err) => Err(err.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `AuthorityError::Storage` if the repository fails.
    pub async fn stats(&self) -> Result<TokenStats, AuthorityError> {
        Ok(self.tokens.token_stats(self.clock.now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;
    use survey_core::time::fixed_now;

    async fn authority_with(token: &str, expires_in: Duration) -> (TokenAuthority, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let record = TokenRecord::new(
            Token::parse(token).unwrap(),
            None,
            Some("control".into()),
            now - Duration::days(30),
            now + expires_in,
        )
        .unwrap();
        repo.insert_token(&record).await.unwrap();
        (
            TokenAuthority::new(Clock::fixed(now), Arc::new(repo.clone())),
            repo,
        )
    }

    #[tokio::test]
    async fn verify_counts_only_initial_logins() {
        let (authority, repo) = authority_with("A1234", Duration::days(1)).await;
        let token = Token::parse("A1234").unwrap();

        let grant = authority.verify(Some("A1234"), false).await.unwrap();
        assert_eq!(grant.group.as_deref(), Some("control"));
        authority.verify(Some("A1234"), false).await.unwrap();
        assert_eq!(repo.get_token(&token).await.unwrap().unwrap().login_count(), 0);

        authority.verify(Some("A1234"), true).await.unwrap();
        let stored = repo.get_token(&token).await.unwrap().unwrap();
        assert_eq!(stored.login_count(), 1);
        assert_eq!(stored.last_used_at(), Some(fixed_now()));
    }

    #[tokio::test]
    async fn verify_rejects_before_touching_storage() {
        let (authority, _repo) = authority_with("A1234", Duration::days(1)).await;
        assert!(matches!(
            authority.verify(None, true).await,
            Err(AuthorityError::TokenRequired)
        ));
        assert!(matches!(
            authority.verify(Some("a1234"), true).await,
            Err(AuthorityError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn expiry_equal_to_now_is_invalid() {
        let (authority, _repo) = authority_with("B7788", Duration::zero()).await;
        assert!(matches!(
            authority.verify(Some("B7788"), false).await,
            Err(AuthorityError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn issue_and_deactivate() {
        let repo = InMemoryRepository::new();
        let authority = TokenAuthority::new(Clock::fixed(fixed_now()), Arc::new(repo));
        let token = Token::parse("C0042").unwrap();

        let record = authority
            .issue(token.clone(), Some("Sam".into()), None, 30)
            .await
            .unwrap();
        assert_eq!(record.expires_at(), fixed_now() + Duration::days(30));
        assert!(matches!(
            authority.issue(token.clone(), None, None, 30).await,
            Err(AuthorityError::DuplicateToken)
        ));
        assert!(matches!(
            authority.issue(Token::parse("C0043").unwrap(), None, None, 0).await,
            Err(AuthorityError::TokenRecord(_))
        ));

        authority.deactivate(&token).await.unwrap();
        assert!(!authority.is_valid(&token).await.unwrap());
        let stats = authority.stats().await.unwrap();
        assert_eq!(stats.used, 1);
    }
}
