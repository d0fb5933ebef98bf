use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

/// Exponential backoff for progress saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub form_id: String,
    pub home_url: String,
    pub verify_timeout: Duration,
    pub autosave_interval: Duration,
    pub retry: RetryPolicy,
    /// Durable credential file; `None` keeps credentials in memory only.
    pub credential_file: Option<PathBuf>,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            form_id: survey_core::model::DEFAULT_FORM_ID.to_owned(),
            home_url: "/".to_owned(),
            verify_timeout: Duration::from_secs(10),
            autosave_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            credential_file: None,
        }
    }

    /// Reads `SURVEY_*` variables, logging each default that is used.
    #[must_use]
    pub fn from_env() -> Self {
        let credential_file = env::var("SURVEY_CREDENTIAL_FILE").ok().map(PathBuf::from);
        Self {
            base_url: try_load("SURVEY_BASE_URL", "http://127.0.0.1:8080".to_owned()),
            form_id: try_load("SURVEY_FORM_ID", survey_core::model::DEFAULT_FORM_ID.to_owned()),
            home_url: try_load("SURVEY_HOME_URL", "/".to_owned()),
            verify_timeout: Duration::from_secs(try_load("SURVEY_VERIFY_TIMEOUT_SECS", 10)),
            autosave_interval: Duration::from_secs(try_load("SURVEY_AUTOSAVE_SECS", 30)),
            retry: RetryPolicy::default(),
            credential_file,
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}
