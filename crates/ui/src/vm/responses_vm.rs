use survey_core::model::{ResponseGroups, ResponseView};

use crate::vm::time_fmt::format_datetime;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseItemVm {
    pub question: String,
    pub answer: String,
    pub submitted_at: String,
}

impl From<&ResponseView> for ResponseItemVm {
    fn from(view: &ResponseView) -> Self {
        Self {
            question: view.display_title(),
            answer: view.answer.clone(),
            submitted_at: format_datetime(view.created_at),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleGroupVm {
    pub name: String,
    pub responses: Vec<ResponseItemVm>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentGroupVm {
    pub name: String,
    pub modules: Vec<ModuleGroupVm>,
}

#[must_use]
pub fn map_response_groups(groups: &ResponseGroups) -> Vec<ParentGroupVm> {
    groups
        .parents()
        .map(|(parent, modules)| ParentGroupVm {
            name: parent.to_owned(),
            modules: modules
                .iter()
                .map(|(module, views)| ModuleGroupVm {
                    name: module.clone(),
                    responses: views.iter().map(ResponseItemVm::from).collect(),
                })
                .collect(),
        })
        .collect()
}
