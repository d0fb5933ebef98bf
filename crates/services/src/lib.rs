#![forbid(unsafe_code)]

pub mod authority;
pub mod client;
pub mod error;
pub mod wire;

pub use survey_core::Clock;

pub use authority::{Authority, ProgressService, ResponseService, SubmissionService, TokenAuthority};
pub use error::{
    AuthorityError, BootstrapError, ProgressError, SubmissionError, TransportError, VerifyError,
};
