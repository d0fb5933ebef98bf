//! Operations shared by both channels; each returns the reply body only.

use services::authority::{PROGRESS_SAVED, SUBMIT_THANKS, VERIFY_SUCCESS};
use services::wire::{
    LoadProgressReply, MessageReply, ResponsesReply, SaveProgressReply, SaveProgressRequest,
    SubmitReply, VerifyReply,
};
use survey_core::model::AnswerSet;
use survey_core::time::to_millis;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn verify(
    state: &AppState,
    token: Option<&str>,
    is_initial_login: bool,
) -> Result<VerifyReply, ApiError> {
    let grant = state.authority.tokens().verify(token, is_initial_login).await?;
    Ok(VerifyReply {
        message: VERIFY_SUCCESS.to_owned(),
        study_group: grant.group,
        expiry: to_millis(grant.expires_at),
    })
}

#[must_use]
pub fn login_message(state: &AppState) -> MessageReply {
    MessageReply {
        message: state.login_html.to_string(),
    }
}

pub async fn save_progress(
    state: &AppState,
    request: &SaveProgressRequest,
) -> Result<SaveProgressReply, ApiError> {
    let saved_at = state.authority.progress().save(request).await?;
    Ok(SaveProgressReply {
        message: PROGRESS_SAVED.to_owned(),
        timestamp: to_millis(saved_at),
    })
}

pub async fn load_progress(
    state: &AppState,
    token: Option<&str>,
    form_id: Option<&str>,
) -> Result<LoadProgressReply, ApiError> {
    let progress = state.authority.progress().load(token, form_id).await?;
    Ok(LoadProgressReply { progress })
}

pub async fn submit(
    state: &AppState,
    token: Option<&str>,
    form_id: Option<&str>,
    answers: &AnswerSet,
) -> Result<SubmitReply, ApiError> {
    let saved = state
        .authority
        .submissions()
        .submit(token, form_id, answers)
        .await?;
    Ok(SubmitReply {
        message: SUBMIT_THANKS.to_owned(),
        saved,
    })
}

pub async fn responses(state: &AppState, token: Option<&str>) -> Result<ResponsesReply, ApiError> {
    let responses = state.authority.responses().fetch(token).await?;
    Ok(ResponsesReply { responses })
}
