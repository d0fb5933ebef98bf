//! Server-side decisions about tokens, progress and survey answers.

mod progress;
mod responses;
mod submission;
mod tokens;

use std::sync::Arc;

use storage::Storage;

use crate::Clock;
use crate::error::BootstrapError;

pub use progress::{ProgressService, sanitize_progress_blob};
pub use responses::ResponseService;
pub use submission::{SUBMIT_THANKS, SubmissionService};
pub use tokens::{TokenAuthority, TokenGrant, parse_token_field};

pub const VERIFY_SUCCESS: &str = "ID verified successfully";
pub const PROGRESS_SAVED: &str = "Progress saved successfully";

/// The authority services wired to one storage backend.
#[derive(Clone)]
pub struct Authority {
    tokens: TokenAuthority,
    progress: ProgressService,
    submissions: SubmissionService,
    responses: ResponseService,
}

impl Authority {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        let tokens = TokenAuthority::new(clock, Arc::clone(&storage.tokens));
        Self {
            progress: ProgressService::new(clock, Arc::clone(&storage.progress)),
            submissions: SubmissionService::new(
                clock,
                tokens.clone(),
                Arc::clone(&storage.responses),
            ),
            responses: ResponseService::new(Arc::clone(&storage.responses)),
            tokens,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `BootstrapError` if the database cannot be opened or migrated.
    pub async fn sqlite(db_url: &str, clock: Clock) -> Result<Self, BootstrapError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(clock, &storage))
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(clock, &Storage::in_memory())
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressService {
        &self.progress
    }

    #[must_use]
    pub fn submissions(&self) -> &SubmissionService {
        &self.submissions
    }

    #[must_use]
    pub fn responses(&self) -> &ResponseService {
        &self.responses
    }
}
