//! Form-encoded `/ajax` channel dispatching on the `action` field.

use axum::{
    Form, Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use services::AuthorityError;
use services::wire::{Legacy, SaveProgressRequest};
use survey_core::model::AnswerSet;

use crate::api;
use crate::error::{ApiError, LegacyError};
use crate::state::AppState;

struct Fields(Vec<(String, String)>);

impl Fields {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn flag(&self, key: &str) -> bool {
        matches!(self.get(key).map(str::trim), Some("1" | "true"))
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn reply<T: Serialize>(result: Result<T, ApiError>) -> Response {
    match result {
        Ok(data) => Json(Legacy::ok(data)).into_response(),
        Err(err) => LegacyError(err).into_response(),
    }
}

pub async fn ajax_handler(
    State(state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let fields = Fields(fields);
    let action = fields.get("action").unwrap_or_default().to_owned();
    match action.as_str() {
        "verify_study_token" => reply(
            api::verify(&state, fields.get("token"), fields.flag("isInitialLogin")).await,
        ),
        "get_login_message" => reply(Ok(api::login_message(&state))),
        "save_user_progress" => {
            let request = SaveProgressRequest {
                token: fields.get("token").unwrap_or_default().to_owned(),
                form_id: fields.get("form_id").unwrap_or_default().to_owned(),
                page_id: fields.number("page_id"),
                page_url: fields.get("page_url").unwrap_or_default().to_owned(),
                module_progress: fields.text("module_progress"),
                last_visited_url: fields.text("last_visited_url"),
                timestamp: fields.number("timestamp"),
            };
            reply(api::save_progress(&state, &request).await)
        }
        "get_user_progress" => reply(
            api::load_progress(&state, fields.get("token"), fields.get("form_id")).await,
        ),
        "submit_survey" => {
            let answers = match AnswerSet::from_form_fields(fields.pairs()) {
                Ok(answers) => answers,
                Err(err) => return reply::<()>(Err(AuthorityError::from(err).into())),
            };
            reply(api::submit(&state, fields.get("token"), fields.get("form_id"), &answers).await)
        }
        "get_survey_responses" => reply(api::responses(&state, fields.get("token")).await),
        other => reply::<()>(Err(ApiError::UnknownAction(other.to_owned()))),
    }
}
