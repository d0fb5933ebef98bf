use std::sync::Arc;

use services::{Authority, BootstrapError, Clock};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub authority: Authority,
    pub login_html: Arc<str>,
    pub structured_api: bool,
}

impl AppState {
    #[must_use]
    pub fn new(authority: Authority, config: &Config) -> Self {
        Self {
            authority,
            login_html: ui::render_login_message(&config.login_url).into(),
            structured_api: config.structured_api,
        }
    }

    /// # Errors
    ///
    /// Returns `BootstrapError` if the database cannot be opened or migrated.
    pub async fn sqlite(config: &Config) -> Result<Self, BootstrapError> {
        let authority = Authority::sqlite(&config.db_url, Clock::default_clock()).await?;
        Ok(Self::new(authority, config))
    }
}
