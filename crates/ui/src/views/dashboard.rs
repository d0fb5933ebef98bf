use dioxus::prelude::*;

use crate::vm::{DashboardVm, VisitItemVm};

#[component]
pub fn ProgressDashboard(dashboard: DashboardVm) -> Element {
    rsx! {
        div { class: "progress-card",
            div { class: "card-header",
                h3 { "My Learning Progress" }
                if let Some(label) = dashboard.completed_label.clone() {
                    span { class: "module-count", "{label}" }
                }
            }
            match dashboard.last_visited.clone() {
                Some(last) => rsx! {
                    LastVisitedCard { last, recent: dashboard.recent.clone() }
                },
                None => rsx! {
                    div { class: "card-content empty-state",
                        p { "No learning progress yet" }
                        p { "Visit learning modules to track your progress" }
                    }
                },
            }
        }
    }
}

#[component]
fn LastVisitedCard(last: VisitItemVm, recent: Vec<VisitItemVm>) -> Element {
    rsx! {
        div { class: "card-content",
            div { class: "last-visited",
                h4 { "Last Visited Module" }
                div { class: "module-title",
                    a { class: "module-link", href: "{last.url}", "{last.title}" }
                }
                div { class: "visit-time", "{last.visited_at}" }
            }
            if !recent.is_empty() {
                div { class: "module-list",
                    h4 { "Recently Visited Modules" }
                    ul {
                        for item in recent {
                            li { key: "{item.url}",
                                a { class: "module-link", href: "{item.url}", "{item.title}" }
                                span { class: "visit-time", "{item.visited_on}" }
                            }
                        }
                    }
                }
            }
        }
    }
}
