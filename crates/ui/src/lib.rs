#![forbid(unsafe_code)]

pub mod render;
pub mod views;
pub mod vm;

pub use render::{
    render_dashboard, render_denied, render_login_fallback, render_login_message,
    render_responses, render_token_entry,
};
