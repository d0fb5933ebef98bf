use dioxus::prelude::*;

use crate::vm::{ModuleGroupVm, ParentGroupVm};

#[component]
pub fn ResponseList(groups: Vec<ParentGroupVm>) -> Element {
    rsx! {
        div { class: "modules-container",
            if groups.is_empty() {
                p { class: "empty-state", "No responses found." }
            }
            for parent in groups {
                div { class: "progress-card module-card", key: "{parent.name}",
                    div { class: "card-header",
                        h3 { "{parent.name}" }
                    }
                    div { class: "card-content",
                        for module in parent.modules {
                            ModuleResponses { module }
                        }
                    }
                }
            }
        }
    }
}

#[component]
fn ModuleResponses(module: ModuleGroupVm) -> Element {
    rsx! {
        div { class: "child-module",
            h4 { class: "module-title", "{module.name}" }
            div { class: "responses-container",
                for response in module.responses {
                    div { class: "response-item",
                        div { class: "question", "{response.question}" }
                        div { class: "answer", "{response.answer}" }
                        div { class: "timestamp", "{response.submitted_at}" }
                    }
                }
            }
        }
    }
}
