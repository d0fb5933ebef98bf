mod dashboard;
mod login;
mod responses;

pub use dashboard::{ProgressDashboard, ProgressDashboardProps};
pub use login::{
    LoginFallback, LoginFallbackProps, LoginMessage, LoginMessageProps, TokenEntry,
    TokenEntryProps,
};
pub use responses::{ResponseList, ResponseListProps};
