use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{FormId, QuestionId};
use super::token::Token;

const ANSWER_KEY_PREFIX: &str = "q_";
const OTHER_SUFFIX: &str = "_other";
const OTHER_CHOICE: &str = "other";

pub const DEFAULT_MODULE: &str = "Uncategorized";
pub const DEFAULT_PARENT_MODULE: &str = "General";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("invalid question key: {0}")]
    InvalidKey(String),
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// Answer to one question: a single choice/text or several checkbox values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Single(String),
    Multiple(Vec<String>),
}

impl AnswerValue {
    /// Stored form of the answer; multiple values are joined with `", "`.
    #[must_use]
    pub fn to_stored(&self) -> String {
        match self {
            AnswerValue::Single(value) => value.trim().to_owned(),
            AnswerValue::Multiple(values) => values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.to_stored().is_empty()
    }

    fn push(&mut self, value: String) {
        match self {
            AnswerValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = AnswerValue::Multiple(vec![first, value]);
            }
            AnswerValue::Multiple(values) => values.push(value),
        }
    }

    fn replace_other(&mut self, text: &str) {
        match self {
            AnswerValue::Single(value) if value.eq_ignore_ascii_case(OTHER_CHOICE) => {
                *value = text.to_owned();
            }
            AnswerValue::Multiple(values) => {
                if let Some(slot) = values
                    .iter_mut()
                    .find(|v| v.eq_ignore_ascii_case(OTHER_CHOICE))
                {
                    *slot = text.to_owned();
                } else {
                    values.push(text.to_owned());
                }
            }
            AnswerValue::Single(_) => self.push(text.to_owned()),
        }
    }
}

/// Answers keyed by question, in question id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(BTreeMap<QuestionId, AnswerValue>);

impl AnswerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, question: QuestionId, value: AnswerValue) {
        self.0.insert(question, value);
    }

    /// Collects answers from submitted form fields.
    ///
    /// Keys look like `q_<id>`, `q_<id>[]` (repeated for multi-value
    /// questions) or `q_<id>_other` (free text replacing an `other` choice).
    /// Other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::InvalidKey` when a `q_` key has no numeric id.
    pub fn from_form_fields<'a, I>(fields: I) -> Result<Self, AnswerError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut answers: BTreeMap<QuestionId, AnswerValue> = BTreeMap::new();
        let mut other_texts: Vec<(QuestionId, String)> = Vec::new();

        for (key, value) in fields {
            let Some(rest) = key.strip_prefix(ANSWER_KEY_PREFIX) else {
                continue;
            };
            if let Some(id) = rest.strip_suffix(OTHER_SUFFIX) {
                let question = parse_question(key, id)?;
                let text = value.trim();
                if !text.is_empty() {
                    other_texts.push((question, text.to_owned()));
                }
                continue;
            }
            let (id, multi) = match rest.strip_suffix("[]") {
                Some(id) => (id, true),
                None => (rest, false),
            };
            let question = parse_question(key, id)?;
            match answers.get_mut(&question) {
                Some(existing) => existing.push(value.to_owned()),
                None if multi => {
                    answers.insert(question, AnswerValue::Multiple(vec![value.to_owned()]));
                }
                None => {
                    answers.insert(question, AnswerValue::Single(value.to_owned()));
                }
            }
        }

        for (question, text) in other_texts {
            answers
                .entry(question)
                .and_modify(|answer| answer.replace_other(&text))
                .or_insert_with(|| AnswerValue::Single(text.clone()));
        }

        Ok(Self(answers))
    }

    /// Answers that carry some text, in stored form.
    pub fn stored_answers(&self) -> impl Iterator<Item = (QuestionId, String)> + '_ {
        self.0.iter().filter_map(|(question, value)| {
            let stored = value.to_stored();
            (!stored.is_empty()).then_some((*question, stored))
        })
    }

    /// Form fields that [`AnswerSet::from_form_fields`] reads back.
    #[must_use]
    pub fn to_form_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        for (question, value) in &self.0 {
            match value {
                AnswerValue::Single(text) => {
                    fields.push((format!("{ANSWER_KEY_PREFIX}{question}"), text.clone()));
                }
                AnswerValue::Multiple(choices) => {
                    let key = format!("{ANSWER_KEY_PREFIX}{question}[]");
                    fields.extend(choices.iter().map(|choice| (key.clone(), choice.clone())));
                }
            }
        }
        fields
    }

    #[must_use]
    pub fn get(&self, question: QuestionId) -> Option<&AnswerValue> {
        self.0.get(&question)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(QuestionId, AnswerValue)> for AnswerSet {
    fn from_iter<T: IntoIterator<Item = (QuestionId, AnswerValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn parse_question(key: &str, id: &str) -> Result<QuestionId, AnswerError> {
    id.parse()
        .map_err(|_| AnswerError::InvalidKey(key.to_owned()))
}

//
// ─── QUESTIONS AND RESPONSES ───────────────────────────────────────────────────
//

/// Authored question as far as response display needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub title: String,
    pub module: Option<String>,
    pub parent_module: Option<String>,
}

impl Question {
    #[must_use]
    pub fn new(id: QuestionId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            module: None,
            parent_module: None,
        }
    }

    #[must_use]
    pub fn in_module(mut self, parent: impl Into<String>, module: impl Into<String>) -> Self {
        self.parent_module = Some(parent.into());
        self.module = Some(module.into());
        self
    }
}

/// One appended answer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub question_id: QuestionId,
    pub token: Token,
    pub form_id: FormId,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// A response joined with its question for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseView {
    pub question_id: QuestionId,
    pub question_title: Option<String>,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    pub form_id: FormId,
    pub module: String,
    pub parent_module: String,
}

impl ResponseView {
    /// Joins a stored response with its question, when the question still exists.
    #[must_use]
    pub fn from_parts(response: SurveyResponse, question: Option<&Question>) -> Self {
        let module = question
            .and_then(|q| q.module.as_deref())
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MODULE)
            .to_owned();
        let parent_module = question
            .and_then(|q| q.parent_module.as_deref())
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_PARENT_MODULE)
            .to_owned();
        Self {
            question_id: response.question_id,
            question_title: question.map(|q| q.title.clone()),
            answer: response.answer,
            created_at: response.created_at,
            form_id: response.form_id,
            module,
            parent_module,
        }
    }

    #[must_use]
    pub fn display_title(&self) -> String {
        self.question_title
            .clone()
            .unwrap_or_else(|| format!("Question {}", self.question_id))
    }
}

/// Responses grouped parent module → module, both alphabetical.
///
/// Within a module, responses keep the order they were given in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseGroups(BTreeMap<String, BTreeMap<String, Vec<ResponseView>>>);

impl ResponseGroups {
    #[must_use]
    pub fn group(views: impl IntoIterator<Item = ResponseView>) -> Self {
        let mut groups: BTreeMap<String, BTreeMap<String, Vec<ResponseView>>> = BTreeMap::new();
        for view in views {
            groups
                .entry(view.parent_module.clone())
                .or_default()
                .entry(view.module.clone())
                .or_default()
                .push(view);
        }
        Self(groups)
    }

    pub fn parents(
        &self,
    ) -> impl Iterator<Item = (&str, &BTreeMap<String, Vec<ResponseView>>)> + '_ {
        self.0.iter().map(|(name, modules)| (name.as_str(), modules))
    }

    #[must_use]
    pub fn module(&self, parent: &str, module: &str) -> Option<&[ResponseView]> {
        self.0
            .get(parent)
            .and_then(|modules| modules.get(module))
            .map(Vec::as_slice)
    }

    #[must_use]
    pub fn response_count(&self) -> usize {
        self.0
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn q(id: u64) -> QuestionId {
        QuestionId::new(id)
    }

    #[test]
    fn form_fields_collect_single_and_multi_answers() {
        let fields = [
            ("action", "submit_survey"),
            ("token", "A1234"),
            ("q_5", "Yes"),
            ("q_9[]", "Red"),
            ("q_9[]", "Blue"),
        ];
        let answers = AnswerSet::from_form_fields(fields).unwrap();

        assert_eq!(answers.len(), 2);
        assert_eq!(answers.get(q(5)), Some(&AnswerValue::Single("Yes".into())));
        let stored: Vec<_> = answers.stored_answers().collect();
        assert_eq!(stored, vec![(q(5), "Yes".into()), (q(9), "Red, Blue".into())]);
    }

    #[test]
    fn other_text_replaces_other_choice() {
        let fields = [
            ("q_3[]", "Walking"),
            ("q_3[]", "other"),
            ("q_3_other", "Rowing"),
            ("q_4", "other"),
            ("q_4_other", " Cycling "),
        ];
        let answers = AnswerSet::from_form_fields(fields).unwrap();
        let stored: Vec<_> = answers.stored_answers().collect();
        assert_eq!(
            stored,
            vec![(q(3), "Walking, Rowing".into()), (q(4), "Cycling".into())]
        );
    }

    #[test]
    fn blank_answers_are_not_stored() {
        let answers = AnswerSet::from_form_fields([("q_1", "  "), ("q_2_other", "")]).unwrap();
        assert_eq!(answers.stored_answers().count(), 0);
    }

    #[test]
    fn non_numeric_question_key_is_rejected() {
        let err = AnswerSet::from_form_fields([("q_abc", "x")]).unwrap_err();
        assert_eq!(err, AnswerError::InvalidKey("q_abc".into()));
    }

    #[test]
    fn answer_value_deserializes_untagged() {
        let set: AnswerSet = serde_json::from_str(r#"{"1":"a","2":["b","c"]}"#).unwrap();
        assert_eq!(set.get(q(2)), Some(&AnswerValue::Multiple(vec!["b".into(), "c".into()])));
    }

    fn view(parent: &str, module: &str, minutes: i64) -> ResponseView {
        ResponseView {
            question_id: q(1),
            question_title: Some("How was it?".into()),
            answer: format!("{parent}/{module}/{minutes}"),
            created_at: fixed_now() - Duration::minutes(minutes),
            form_id: FormId::default(),
            module: module.into(),
            parent_module: parent.into(),
        }
    }

    #[test]
    fn view_defaults_modules_when_question_is_unassigned() {
        let response = SurveyResponse {
            question_id: q(8),
            token: Token::parse("A1234").unwrap(),
            form_id: FormId::default(),
            answer: "Fine".into(),
            created_at: fixed_now(),
        };
        let joined = ResponseView::from_parts(response.clone(), None);
        assert_eq!(joined.module, "Uncategorized");
        assert_eq!(joined.parent_module, "General");
        assert_eq!(joined.display_title(), "Question 8");

        let question = Question::new(q(8), "Mood").in_module("Week 1", "Sleep");
        let joined = ResponseView::from_parts(response, Some(&question));
        assert_eq!(joined.module, "Sleep");
        assert_eq!(joined.parent_module, "Week 1");
    }

    #[test]
    fn groups_sort_names_and_keep_response_order() {
        let views = vec![
            view("Week 2", "Diet", 1),
            view("General", "Uncategorized", 2),
            view("Week 2", "Diet", 3),
            view("Week 2", "Activity", 4),
        ];
        let groups = ResponseGroups::group(views);

        let parents: Vec<_> = groups.parents().map(|(name, _)| name).collect();
        assert_eq!(parents, vec!["General", "Week 2"]);
        let diet = groups.module("Week 2", "Diet").unwrap();
        assert_eq!(diet[0].answer, "Week 2/Diet/1");
        assert_eq!(diet[1].answer, "Week 2/Diet/3");
        assert_eq!(groups.response_count(), 4);
    }
}
