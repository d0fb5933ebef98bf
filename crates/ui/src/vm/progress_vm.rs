use services::client::ProgressView;
use survey_core::model::VisitEntry;

use crate::vm::time_fmt::{format_date, format_datetime};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitItemVm {
    pub title: String,
    pub url: String,
    pub visited_on: String,
    pub visited_at: String,
}

impl From<&VisitEntry> for VisitItemVm {
    fn from(entry: &VisitEntry) -> Self {
        Self {
            title: entry.display_title(),
            url: entry.url.clone(),
            visited_on: format_date(entry.timestamp),
            visited_at: format_datetime(entry.timestamp),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DashboardVm {
    pub last_visited: Option<VisitItemVm>,
    /// Empty unless more than one page was visited.
    pub recent: Vec<VisitItemVm>,
    pub completed_label: Option<String>,
}

impl DashboardVm {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_visited.is_none()
    }
}

#[must_use]
pub fn map_dashboard(view: &ProgressView) -> DashboardVm {
    let count = view.completed_count;
    let completed_label = (count > 0).then(|| {
        let plural = if count == 1 { "" } else { "s" };
        format!("{count} item{plural} completed")
    });
    let recent = if view.entries.len() > 1 {
        view.recent.iter().map(VisitItemVm::from).collect()
    } else {
        Vec::new()
    };
    DashboardVm {
        last_visited: view.last_visited.as_ref().map(VisitItemVm::from),
        recent,
        completed_label,
    }
}
