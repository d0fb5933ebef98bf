#![forbid(unsafe_code)]

pub mod access;
pub mod error;
pub mod model;
pub mod time;

pub use access::ProtectedPaths;
pub use error::ErrorCode;
pub use time::Clock;
