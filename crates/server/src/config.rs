use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_url: String,
    pub home_url: String,
    /// Target of the "Log in here" link in the login prompt.
    pub login_url: String,
    /// When false the `/api/v1` routes answer 503 and clients use `/ajax`.
    pub structured_api: bool,
    pub token_expiry_days: u32,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        let home_url: String = try_load("SURVEY_HOME_URL", "/");
        Self {
            port: try_load("SURVEY_PORT", "8080"),
            db_url: try_load("SURVEY_DB_URL", "sqlite://survey.sqlite3"),
            login_url: try_load("SURVEY_LOGIN_URL", &home_url),
            home_url,
            structured_api: try_load("SURVEY_STRUCTURED_API", "true"),
            token_expiry_days: try_load("SURVEY_TOKEN_EXPIRY_DAYS", "365"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            db_url: "sqlite://survey.sqlite3".to_owned(),
            home_url: "/".to_owned(),
            login_url: "/".to_owned(),
            structured_api: true,
            token_expiry_days: 365,
        }
    }
}

fn parse_or<T: FromStr>(key: &str, raw: &str) -> Option<T>
where
    T::Err: Display,
{
    raw.parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .ok()
}

/// Value of `key`, else `default`, else `T::default()`.
fn try_load<T>(key: &str, default: &str) -> T
where
    T: FromStr + Default,
    T::Err: Display,
{
    env::var(key)
        .ok()
        .and_then(|raw| parse_or(key, &raw))
        .or_else(|| {
            info!("{key} using default: {default}");
            parse_or(key, default)
        })
        .unwrap_or_default()
}
