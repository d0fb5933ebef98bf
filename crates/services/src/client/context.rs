use std::sync::Arc;

use storage::ttl::{FileStore, MemoryStore, TtlEntry, TtlStore};
use survey_core::Clock;
use survey_core::model::{SessionCredential, Token};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::verifier::{TokenVerifier, VerifiedSession};
use crate::error::VerifyError;

pub const CREDENTIAL_KEY: &str = "survey_token";
const EVENT_CAPACITY: usize = 16;

/// Session changes other components react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Verified(VerifiedSession),
    Cleared,
}

/// The participant's credential, mirrored across several stores.
///
/// Writes go to every tier. A read takes the first live entry and copies it
/// back into the others; an expired or unreadable entry anywhere wipes them all.
#[derive(Clone)]
pub struct CredentialCache {
    tiers: Vec<Arc<dyn TtlStore>>,
    clock: Clock,
}

impl CredentialCache {
    #[must_use]
    pub fn new(tiers: Vec<Arc<dyn TtlStore>>, clock: Clock) -> Self {
        Self { tiers, clock }
    }

    /// Session tier in memory, durable tier in a JSON file.
    #[must_use]
    pub fn with_file(path: impl Into<std::path::PathBuf>, clock: Clock) -> Self {
        Self::new(
            vec![
                Arc::new(MemoryStore::new()),
                Arc::new(FileStore::new(path)),
            ],
            clock,
        )
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(vec![Arc::new(MemoryStore::new())], clock)
    }

    pub async fn load(&self) -> Option<SessionCredential> {
        let now = self.clock.now();
        let mut found = None;
        for tier in &self.tiers {
            match tier.get(CREDENTIAL_KEY).await {
                Ok(None) => {}
                Ok(Some(entry)) if entry.is_expired_at(now) => {
                    debug!(tier = tier.name(), "stored credential expired");
                    self.clear().await;
                    return None;
                }
                Ok(Some(entry)) => match Token::parse(&entry.value) {
                    Ok(token) if found.is_none() => {
                        found = Some(SessionCredential::new(token, entry.expires_at));
                    }
                    Ok(_) => {}
                    Err(_) => {
                        warn!(tier = tier.name(), "stored credential is malformed");
                        self.clear().await;
                        return None;
                    }
                },
                Err(err) => {
                    warn!(tier = tier.name(), error = %err, "stored credential is unreadable");
                    self.clear().await;
                    return None;
                }
            }
        }
        if let Some(credential) = &found {
            self.store(credential).await;
        }
        found
    }

    pub async fn store(&self, credential: &SessionCredential) {
        let entry = TtlEntry::new(credential.token.as_str(), credential.expires_at);
        for tier in &self.tiers {
            if let Err(err) = tier.put(CREDENTIAL_KEY, entry.clone()).await {
                warn!(tier = tier.name(), error = %err, "failed to store credential");
            }
        }
    }

    pub async fn clear(&self) {
        for tier in &self.tiers {
            if let Err(err) = tier.remove(CREDENTIAL_KEY).await {
                warn!(tier = tier.name(), error = %err, "failed to clear credential");
            }
        }
    }
}

struct Inner {
    cache: CredentialCache,
    verifier: TokenVerifier,
    events: broadcast::Sender<AuthEvent>,
}

/// Shared handle to the participant's session.
///
/// Clone it into every component that needs the token.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<Inner>,
}

impl AuthContext {
    #[must_use]
    pub fn new(cache: CredentialCache, verifier: TokenVerifier) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                cache,
                verifier,
                events,
            }),
        }
    }

    pub async fn credential(&self) -> Option<SessionCredential> {
        self.inner.cache.load().await
    }

    pub async fn token(&self) -> Option<Token> {
        self.credential().await.map(|c| c.token)
    }

    pub async fn store(&self, credential: &SessionCredential) {
        self.inner.cache.store(credential).await;
    }

    /// Forget the credential and tell subscribers.
    pub async fn clear(&self) {
        self.inner.cache.clear().await;
        info!("credential cleared");
        let _ = self.inner.events.send(AuthEvent::Cleared);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.inner.verifier
    }

    /// Verify `candidate` and keep the cache in step with the answer.
    ///
    /// Success stores the credential and publishes `Verified`. A format error
    /// or a rejected token clears it. Transport trouble leaves it alone.
    ///
    /// # Errors
    ///
    /// Propagates the `VerifyError` from the verifier.
    pub async fn verify(
        &self,
        candidate: &str,
        is_initial_login: bool,
    ) -> Result<VerifiedSession, VerifyError> {
        match self.inner.verifier.verify(candidate, is_initial_login).await {
            Ok(session) => {
                self.store(&session.credential()).await;
                let _ = self.inner.events.send(AuthEvent::Verified(session.clone()));
                Ok(session)
            }
            Err(err @ (VerifyError::InvalidFormat(_) | VerifyError::InvalidOrExpired)) => {
                self.clear().await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use survey_core::time::fixed_now;

    fn credential(token: &str, expires_in: Duration) -> SessionCredential {
        SessionCredential::new(Token::parse(token).unwrap(), fixed_now() + expires_in)
    }

    fn tiers() -> (Arc<MemoryStore>, Arc<MemoryStore>) {
        (Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn store_writes_every_tier_and_load_resyncs() {
        let (session, durable) = tiers();
        let cache = CredentialCache::new(
            vec![session.clone(), durable.clone()],
            Clock::fixed(fixed_now()),
        );
        cache.store(&credential("A1234", Duration::hours(1))).await;
        assert!(session.get(CREDENTIAL_KEY).await.unwrap().is_some());

        session.remove(CREDENTIAL_KEY).await.unwrap();
        let loaded = cache.load().await.unwrap();
        assert_eq!(loaded.token.as_str(), "A1234");
        assert!(session.get(CREDENTIAL_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_entry_in_any_tier_clears_all() {
        let (session, durable) = tiers();
        let cache = CredentialCache::new(
            vec![session.clone(), durable.clone()],
            Clock::fixed(fixed_now()),
        );
        session
            .put(CREDENTIAL_KEY, TtlEntry::new("A1234", fixed_now() + Duration::hours(1)))
            .await
            .unwrap();
        durable
            .put(CREDENTIAL_KEY, TtlEntry::new("A1234", fixed_now()))
            .await
            .unwrap();

        assert!(cache.load().await.is_none());
        assert!(session.get(CREDENTIAL_KEY).await.unwrap().is_none());
        assert!(durable.get(CREDENTIAL_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_token_is_discarded() {
        let (session, _) = tiers();
        let cache = CredentialCache::new(vec![session.clone()], Clock::fixed(fixed_now()));
        session
            .put(CREDENTIAL_KEY, TtlEntry::new("a1234", fixed_now() + Duration::hours(1)))
            .await
            .unwrap();
        assert!(cache.load().await.is_none());
        assert!(session.get(CREDENTIAL_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_tier_survives_a_new_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        let clock = Clock::fixed(fixed_now());

        CredentialCache::with_file(&path, clock)
            .store(&credential("B7788", Duration::days(2)))
            .await;

        let reopened = CredentialCache::with_file(&path, clock);
        let loaded = reopened.load().await.unwrap();
        assert_eq!(loaded.token.as_str(), "B7788");

        reopened.clear().await;
        assert!(CredentialCache::with_file(&path, clock).load().await.is_none());
    }

    #[tokio::test]
    async fn clear_publishes_event() {
        let cache = CredentialCache::in_memory(Clock::fixed(fixed_now()));
        let ctx = AuthContext::new(cache, TokenVerifier::new(Vec::new(), std::time::Duration::from_secs(1)));
        let mut events = ctx.subscribe();
        ctx.store(&credential("A1234", Duration::hours(1))).await;
        assert!(ctx.token().await.is_some());

        ctx.clear().await;
        assert_eq!(events.recv().await.unwrap(), AuthEvent::Cleared);
        assert!(ctx.credential().await.is_none());
    }
}
