mod progress_vm;
mod responses_vm;
mod time_fmt;

pub use progress_vm::{DashboardVm, VisitItemVm, map_dashboard};
pub use responses_vm::{ModuleGroupVm, ParentGroupVm, ResponseItemVm, map_response_groups};
pub use time_fmt::{format_date, format_datetime};
