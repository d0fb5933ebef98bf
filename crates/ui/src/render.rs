//! HTML strings for the server and for denied page loads.

use dioxus::prelude::*;
use services::client::{LoginPrompt, ProgressView};
use survey_core::model::ResponseGroups;

use crate::views::{
    LoginFallback, LoginFallbackProps, LoginMessage, LoginMessageProps, ProgressDashboard,
    ProgressDashboardProps, ResponseList, ResponseListProps, TokenEntry, TokenEntryProps,
};
use crate::vm::{map_dashboard, map_response_groups};

fn render_dom(mut dom: VirtualDom) -> String {
    dom.rebuild_in_place();
    dioxus_ssr::render(&dom)
}

#[must_use]
pub fn render_login_message(login_url: &str) -> String {
    render_dom(VirtualDom::new_with_props(
        LoginMessage,
        LoginMessageProps {
            login_url: login_url.to_owned(),
        },
    ))
}

#[must_use]
pub fn render_login_fallback(home_url: &str) -> String {
    render_dom(VirtualDom::new_with_props(
        LoginFallback,
        LoginFallbackProps {
            home_url: home_url.to_owned(),
        },
    ))
}

/// Content that replaces a protected page after a denial.
#[must_use]
pub fn render_denied(prompt: &LoginPrompt) -> String {
    match prompt {
        LoginPrompt::Server(html) => html.clone(),
        LoginPrompt::Fallback { home_url } => render_login_fallback(home_url),
    }
}

#[must_use]
pub fn render_token_entry(action: &str, error: Option<&str>) -> String {
    render_dom(VirtualDom::new_with_props(
        TokenEntry,
        TokenEntryProps {
            action: action.to_owned(),
            error: error.map(str::to_owned),
        },
    ))
}

#[must_use]
pub fn render_dashboard(view: &ProgressView) -> String {
    render_dom(VirtualDom::new_with_props(
        ProgressDashboard,
        ProgressDashboardProps {
            dashboard: map_dashboard(view),
        },
    ))
}

#[must_use]
pub fn render_responses(groups: &ResponseGroups) -> String {
    render_dom(VirtualDom::new_with_props(
        ResponseList,
        ResponseListProps {
            groups: map_response_groups(groups),
        },
    ))
}
