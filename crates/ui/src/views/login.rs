use dioxus::prelude::*;

/// Replacement content for a protected page when the server prompt is available.
#[component]
pub fn LoginMessage(login_url: String) -> Element {
    rsx! {
        div { class: "login-message-container",
            div { class: "login-message-box",
                h2 { "Please Log In to View" }
                p { "This content is protected. Please log in with your ID to access this page." }
                a { class: "login-button", href: "{login_url}", "Log in here" }
            }
        }
    }
}

/// Shown when even the login prompt could not be fetched.
#[component]
pub fn LoginFallback(home_url: String) -> Element {
    rsx! {
        div { class: "error-message",
            h3 { "Please Log In" }
            p {
                "You need to log in to access this content. "
                a { href: "{home_url}", "Click here to log in" }
            }
        }
    }
}

/// Token entry field with its inline validation message.
#[component]
pub fn TokenEntry(action: String, error: Option<String>) -> Element {
    rsx! {
        form { class: "study-token-form", method: "post", action: "{action}",
            label { r#for: "study-token", "Enter your ID" }
            input {
                id: "study-token",
                name: "token",
                r#type: "text",
                maxlength: "5",
                autocomplete: "off",
                placeholder: "e.g., A1234",
            }
            button { r#type: "submit", "Continue" }
            if let Some(message) = error {
                p { class: "token-error", role: "alert", "{message}" }
            }
        }
    }
}
