//! Structured JSON channel under `/api/v1`.

use axum::{
    Json, Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use services::wire::{
    LoadProgressReply, LoadProgressRequest, MessageReply, ResponsesReply, ResponsesRequest,
    SaveProgressReply, SaveProgressRequest, Structured, SubmitReply, SubmitRequest, VerifyReply,
    VerifyRequest,
};

use crate::api;
use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<Structured<T>>, ApiError>;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/verify-token", post(verify_token_handler))
        .route("/login-message", post(login_message_handler))
        .route("/progress/save", post(save_progress_handler))
        .route("/progress/load", post(load_progress_handler))
        .route("/submit", post(submit_handler))
        .route("/responses", post(responses_handler))
        .layer(middleware::from_fn_with_state(state, require_enabled))
}

async fn require_enabled(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.structured_api {
        return ApiError::ChannelDisabled.into_response();
    }
    next.run(request).await
}

pub async fn verify_token_handler(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<VerifyReply> {
    let reply = api::verify(&state, Some(&request.token), request.is_initial_login).await?;
    Ok(Json(Structured::ok(reply)))
}

pub async fn login_message_handler(State(state): State<AppState>) -> Json<Structured<MessageReply>> {
    Json(Structured::ok(api::login_message(&state)))
}

pub async fn save_progress_handler(
    State(state): State<AppState>,
    Json(request): Json<SaveProgressRequest>,
) -> ApiResult<SaveProgressReply> {
    Ok(Json(Structured::ok(api::save_progress(&state, &request).await?)))
}

pub async fn load_progress_handler(
    State(state): State<AppState>,
    Json(request): Json<LoadProgressRequest>,
) -> ApiResult<LoadProgressReply> {
    let reply = api::load_progress(&state, Some(&request.token), Some(&request.form_id)).await?;
    Ok(Json(Structured::ok(reply)))
}

pub async fn submit_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<SubmitReply> {
    let reply = api::submit(
        &state,
        Some(&request.token),
        request.form_id.as_deref(),
        &request.answers,
    )
    .await?;
    Ok(Json(Structured::ok(reply)))
}

pub async fn responses_handler(
    State(state): State<AppState>,
    Json(request): Json<ResponsesRequest>,
) -> ApiResult<ResponsesReply> {
    Ok(Json(Structured::ok(api::responses(&state, Some(&request.token)).await?)))
}
