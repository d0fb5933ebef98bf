//! Ways of reaching the survey server.
//!
//! [`RestTransport`] speaks the structured JSON API, [`AjaxTransport`] the
//! form-encoded legacy endpoint and [`LocalTransport`] calls the authority
//! services in-process.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use survey_core::model::{FormId, ResponseView, Token};
use survey_core::time::to_millis;

use crate::authority::{Authority, PROGRESS_SAVED, SUBMIT_THANKS, VERIFY_SUCCESS};
use crate::error::{AuthorityError, TransportError};
use crate::wire::{
    ErrorReply, Legacy, LoadProgressReply, LoadProgressRequest, MessageReply, ProgressPayload,
    ResponsesReply, ResponsesRequest, SaveProgressReply, SaveProgressRequest, Structured,
    SubmitReply, SubmitRequest, VerifyReply, VerifyRequest,
};

/// One strategy for asking the server whether a token is valid.
#[async_trait]
pub trait VerifyTransport: Send + Sync {
    /// Label used in logs and outcomes.
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns `TransportError::Rejected` when the server answered with an
    /// error code, other variants when no usable answer arrived.
    async fn verify(&self, token: &Token, is_initial_login: bool)
    -> Result<VerifyReply, TransportError>;
}

/// Everything else a participant page asks of the server.
#[async_trait]
pub trait SurveyApi: Send + Sync {
    /// Login prompt markup shown when access is denied.
    async fn login_message(&self) -> Result<String, TransportError>;

    async fn save_progress(
        &self,
        request: &SaveProgressRequest,
    ) -> Result<SaveProgressReply, TransportError>;

    async fn load_progress(
        &self,
        token: &Token,
        form_id: &FormId,
    ) -> Result<ProgressPayload, TransportError>;

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, TransportError>;

    async fn responses(&self, token: &Token) -> Result<Vec<ResponseView>, TransportError>;
}

//
// ─── STRUCTURED CHANNEL ────────────────────────────────────────────────────────
//

/// JSON API under `/api/v1`.
#[derive(Clone)]
pub struct RestTransport {
    client: Client,
    base_url: String,
}

impl RestTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.client.post(self.endpoint(path)).json(body).send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        if let Ok(reply) = serde_json::from_slice::<Structured<ErrorReply>>(&bytes) {
            if !reply.success {
                return Err(TransportError::Rejected {
                    code: reply.body.code,
                    message: reply.body.message,
                });
            }
        }
        if !(200..300).contains(&status) {
            return Err(TransportError::Status { status });
        }
        let reply: Structured<T> = serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        if !reply.success {
            return Err(TransportError::Malformed("unsuccessful reply without code".into()));
        }
        Ok(reply.body)
    }
}

#[async_trait]
impl VerifyTransport for RestTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn verify(
        &self,
        token: &Token,
        is_initial_login: bool,
    ) -> Result<VerifyReply, TransportError> {
        let request = VerifyRequest {
            token: token.as_str().to_owned(),
            is_initial_login,
        };
        self.post("verify-token", &request).await
    }
}

#[async_trait]
impl SurveyApi for RestTransport {
    async fn login_message(&self) -> Result<String, TransportError> {
        let reply: MessageReply = self.post("login-message", &serde_json::json!({})).await?;
        Ok(reply.message)
    }

    async fn save_progress(
        &self,
        request: &SaveProgressRequest,
    ) -> Result<SaveProgressReply, TransportError> {
        self.post("progress/save", request).await
    }

    async fn load_progress(
        &self,
        token: &Token,
        form_id: &FormId,
    ) -> Result<ProgressPayload, TransportError> {
        let request = LoadProgressRequest {
            token: token.as_str().to_owned(),
            form_id: form_id.as_str().to_owned(),
        };
        let reply: LoadProgressReply = self.post("progress/load", &request).await?;
        Ok(reply.progress)
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, TransportError> {
        self.post("submit", request).await
    }

    async fn responses(&self, token: &Token) -> Result<Vec<ResponseView>, TransportError> {
        let request = ResponsesRequest {
            token: token.as_str().to_owned(),
        };
        let reply: ResponsesReply = self.post("responses", &request).await?;
        Ok(reply.responses)
    }
}

//
// ─── LEGACY CHANNEL ────────────────────────────────────────────────────────────
//

/// Form-encoded `POST /ajax` with an `action` field.
#[derive(Clone)]
pub struct AjaxTransport {
    client: Client,
    base_url: String,
}

impl AjaxTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn call<T>(&self, action: &str, fields: Vec<(String, String)>) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let mut form = Vec::with_capacity(fields.len() + 1);
        form.push(("action".to_owned(), action.to_owned()));
        form.extend(fields);

        let url = format!("{}/ajax", self.base_url.trim_end_matches('/'));
        let response = self.client.post(url).form(&form).send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        if let Ok(reply) = serde_json::from_slice::<Legacy<ErrorReply>>(&bytes) {
            if !reply.success {
                return Err(TransportError::Rejected {
                    code: reply.data.code,
                    message: reply.data.message,
                });
            }
        }
        if !(200..300).contains(&status) {
            return Err(TransportError::Status { status });
        }
        let reply: Legacy<T> = serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        if !reply.success {
            return Err(TransportError::Malformed("unsuccessful reply without code".into()));
        }
        Ok(reply.data)
    }
}

fn field(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_owned(), value.into())
}

#[async_trait]
impl VerifyTransport for AjaxTransport {
    fn name(&self) -> &'static str {
        "ajax"
    }

    async fn verify(
        &self,
        token: &Token,
        is_initial_login: bool,
    ) -> Result<VerifyReply, TransportError> {
        let flag = if is_initial_login { "1" } else { "0" };
        self.call(
            "verify_study_token",
            vec![field("token", token.as_str()), field("isInitialLogin", flag)],
        )
        .await
    }
}

#[async_trait]
impl SurveyApi for AjaxTransport {
    async fn login_message(&self) -> Result<String, TransportError> {
        let reply: MessageReply = self.call("get_login_message", Vec::new()).await?;
        Ok(reply.message)
    }

    async fn save_progress(
        &self,
        request: &SaveProgressRequest,
    ) -> Result<SaveProgressReply, TransportError> {
        let mut fields = vec![
            field("token", request.token.as_str()),
            field("form_id", request.form_id.as_str()),
            field("page_url", request.page_url.as_str()),
        ];
        if let Some(page_id) = request.page_id {
            fields.push(field("page_id", page_id.to_string()));
        }
        if let Some(blob) = &request.module_progress {
            fields.push(field("module_progress", blob.as_str()));
        }
        if let Some(url) = &request.last_visited_url {
            fields.push(field("last_visited_url", url.as_str()));
        }
        if let Some(timestamp) = request.timestamp {
            fields.push(field("timestamp", timestamp.to_string()));
        }
        self.call("save_user_progress", fields).await
    }

    async fn load_progress(
        &self,
        token: &Token,
        form_id: &FormId,
    ) -> Result<ProgressPayload, TransportError> {
        let reply: LoadProgressReply = self
            .call(
                "get_user_progress",
                vec![field("token", token.as_str()), field("form_id", form_id.as_str())],
            )
            .await?;
        Ok(reply.progress)
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, TransportError> {
        let mut fields = vec![field("token", request.token.as_str())];
        if let Some(form_id) = &request.form_id {
            fields.push(field("form_id", form_id.as_str()));
        }
        fields.extend(request.answers.to_form_fields());
        self.call("submit_survey", fields).await
    }

    async fn responses(&self, token: &Token) -> Result<Vec<ResponseView>, TransportError> {
        let reply: ResponsesReply = self
            .call("get_survey_responses", vec![field("token", token.as_str())])
            .await?;
        Ok(reply.responses)
    }
}

//
// ─── IN-PROCESS ────────────────────────────────────────────────────────────────
//

/// Calls the authority services directly; used by the CLI and tests.
#[derive(Clone)]
pub struct LocalTransport {
    authority: Authority,
    login_html: String,
}

impl LocalTransport {
    #[must_use]
    pub fn new(authority: Authority, login_html: impl Into<String>) -> Self {
        Self {
            authority,
            login_html: login_html.into(),
        }
    }
}

fn rejected(err: &AuthorityError) -> TransportError {
    TransportError::Rejected {
        code: err.code(),
        message: err.public_message(),
    }
}

#[async_trait]
impl VerifyTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn verify(
        &self,
        token: &Token,
        is_initial_login: bool,
    ) -> Result<VerifyReply, TransportError> {
        let grant = self
            .authority
            .tokens()
            .verify(Some(token.as_str()), is_initial_login)
            .await
            .map_err(|e| rejected(&e))?;
        Ok(VerifyReply {
            message: VERIFY_SUCCESS.to_owned(),
            study_group: grant.group,
            expiry: to_millis(grant.expires_at),
        })
    }
}

#[async_trait]
impl SurveyApi for LocalTransport {
    async fn login_message(&self) -> Result<String, TransportError> {
        Ok(self.login_html.clone())
    }

    async fn save_progress(
        &self,
        request: &SaveProgressRequest,
    ) -> Result<SaveProgressReply, TransportError> {
        let saved_at = self
            .authority
            .progress()
            .save(request)
            .await
            .map_err(|e| rejected(&e))?;
        Ok(SaveProgressReply {
            message: PROGRESS_SAVED.to_owned(),
            timestamp: to_millis(saved_at),
        })
    }

    async fn load_progress(
        &self,
        token: &Token,
        form_id: &FormId,
    ) -> Result<ProgressPayload, TransportError> {
        self.authority
            .progress()
            .load(Some(token.as_str()), Some(form_id.as_str()))
            .await
            .map_err(|e| rejected(&e))
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitReply, TransportError> {
        let saved = self
            .authority
            .submissions()
            .submit(
                Some(request.token.as_str()),
                request.form_id.as_deref(),
                &request.answers,
            )
            .await
            .map_err(|e| rejected(&e))?;
        Ok(SubmitReply {
            message: SUBMIT_THANKS.to_owned(),
            saved,
        })
    }

    async fn responses(&self, token: &Token) -> Result<Vec<ResponseView>, TransportError> {
        self.authority
            .responses()
            .fetch(Some(token.as_str()))
            .await
            .map_err(|e| rejected(&e))
    }
}
