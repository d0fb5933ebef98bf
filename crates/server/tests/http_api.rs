use std::sync::Arc;
use std::time::Duration;

use server::{AppState, Config};
use services::client::{AjaxTransport, RestTransport, SurveyApi, TokenVerifier, VerifyTransport};
use services::wire::{SaveProgressRequest, SubmitRequest};
use services::{Authority, Clock, TransportError, VerifyError};
use storage::Storage;
use survey_core::ErrorCode;
use survey_core::model::{AnswerSet, AnswerValue, FormId, QuestionId, Token};
use tokio::net::TcpListener;

struct TestServer {
    base_url: String,
    storage: Storage,
    authority: Authority,
}

async fn spawn(structured_api: bool) -> TestServer {
    let storage = Storage::in_memory();
    let authority = Authority::new(Clock::default_clock(), &storage);
    let config = Config {
        structured_api,
        login_url: "https://site.test/login/".into(),
        ..Config::default()
    };
    let state = AppState::new(authority.clone(), &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(state)).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        storage,
        authority,
    }
}

impl TestServer {
    async fn issue(&self, token: &str) -> Token {
        let token = Token::parse(token).unwrap();
        self.authority
            .tokens()
            .issue(token.clone(), Some("Participant".into()), Some("control".into()), 30)
            .await
            .unwrap();
        token
    }

    async fn login_count(&self, token: &Token) -> u32 {
        self.storage
            .tokens
            .get_token(token)
            .await
            .unwrap()
            .unwrap()
            .login_count()
    }
}

#[tokio::test]
async fn rest_verify_counts_initial_login_only() {
    let server = spawn(true).await;
    let token = server.issue("B7788").await;
    let rest = RestTransport::new(&server.base_url);

    let reply = rest.verify(&token, true).await.unwrap();
    assert_eq!(reply.message, "ID verified successfully");
    assert_eq!(reply.study_group.as_deref(), Some("control"));
    rest.verify(&token, false).await.unwrap();

    assert_eq!(server.login_count(&token).await, 1);
}

#[tokio::test]
async fn rest_rejects_unknown_token_with_code() {
    let server = spawn(true).await;
    let rest = RestTransport::new(&server.base_url);

    let err = rest
        .verify(&Token::parse("Z9999").unwrap(), true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::Rejected { code: ErrorCode::InvalidToken, .. }
    ));
}

#[tokio::test]
async fn structured_status_codes_follow_error_kind() {
    let server = spawn(true).await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/verify-token", server.base_url);

    let blank = client
        .post(&url)
        .json(&serde_json::json!({ "token": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), 400);
    let body: serde_json::Value = blank.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "token_required");

    let bad = client
        .post(&url)
        .json(&serde_json::json!({ "token": "12345" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 400);
    let body: serde_json::Value = bad.json().await.unwrap();
    assert_eq!(body["code"], "invalid_format");

    let unknown = client
        .post(&url)
        .json(&serde_json::json!({ "token": "Q1111" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 401);
}

#[tokio::test]
async fn legacy_channel_wraps_replies_in_data() {
    let server = spawn(true).await;
    server.issue("C2468").await;
    let client = reqwest::Client::new();

    let reply: serde_json::Value = client
        .post(format!("{}/ajax", server.base_url))
        .form(&[("action", "verify_study_token"), ("token", "C2468"), ("isInitialLogin", "1")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["study_group"], "control");

    let unknown = client
        .post(format!("{}/ajax", server.base_url))
        .form(&[("action", "drop_tables")])
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 200);
    let body: serde_json::Value = unknown.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn disabled_structured_channel_falls_back_to_ajax() {
    let server = spawn(false).await;
    let token = server.issue("D1357").await;

    let rest = RestTransport::new(&server.base_url);
    let err = rest.verify(&token, true).await.unwrap_err();
    assert!(matches!(
        err,
        TransportError::Rejected { code: ErrorCode::ChannelDisabled, .. }
    ));

    let verifier = TokenVerifier::new(
        vec![
            Arc::new(rest) as Arc<dyn VerifyTransport>,
            Arc::new(AjaxTransport::new(&server.base_url)),
        ],
        Duration::from_secs(10),
    );
    let session = verifier.verify("D1357", true).await.unwrap();
    assert_eq!(session.token, token);
    assert_eq!(server.login_count(&token).await, 1);

    let missing = verifier.verify("E0000", false).await.unwrap_err();
    assert!(matches!(missing, VerifyError::InvalidOrExpired));
}

#[tokio::test]
async fn progress_and_submission_work_on_both_channels() {
    let server = spawn(true).await;
    let token = server.issue("F2020").await;
    let channels: Vec<Arc<dyn SurveyApi>> = vec![
        Arc::new(RestTransport::new(&server.base_url)),
        Arc::new(AjaxTransport::new(&server.base_url)),
    ];

    for (i, api) in channels.iter().enumerate() {
        let form_id = format!("week-{i}");
        let saved = api
            .save_progress(&SaveProgressRequest {
                token: token.as_str().to_owned(),
                form_id: form_id.clone(),
                page_id: Some(12),
                page_url: "/module-2/".into(),
                module_progress: Some(r#"{"/module-2/":{"visited":true}}"#.into()),
                last_visited_url: None,
                timestamp: None,
            })
            .await
            .unwrap();
        assert_eq!(saved.message, "Progress saved successfully");

        let loaded = api
            .load_progress(&token, &FormId::new(form_id.clone()).unwrap())
            .await
            .unwrap();
        assert_eq!(loaded.current_page_id, Some(12));
        assert_eq!(loaded.last_visited_url.as_deref(), Some("/module-2/"));

        let mut answers = AnswerSet::new();
        answers.insert(QuestionId::new(1), AnswerValue::Single("Rested".into()));
        answers.insert(
            QuestionId::new(2),
            AnswerValue::Multiple(vec!["walk".into(), "read".into()]),
        );
        let reply = api
            .submit(&SubmitRequest {
                token: token.as_str().to_owned(),
                form_id: Some(form_id),
                answers,
            })
            .await
            .unwrap();
        assert_eq!(reply.saved, 2);
    }

    let responses = channels[0].responses(&token).await.unwrap();
    assert_eq!(responses.len(), 4);
    assert!(responses.iter().any(|r| r.answer == "walk, read"));
}

#[tokio::test]
async fn empty_submission_reports_no_answers_saved() {
    let server = spawn(true).await;
    let token = server.issue("G4040").await;
    let ajax = AjaxTransport::new(&server.base_url);

    let err = ajax
        .submit(&SubmitRequest {
            token: token.as_str().to_owned(),
            form_id: None,
            answers: AnswerSet::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::Rejected { code: ErrorCode::NoAnswersSaved, .. }
    ));
}

#[tokio::test]
async fn login_message_links_to_configured_url() {
    let server = spawn(true).await;
    let html = RestTransport::new(&server.base_url)
        .login_message()
        .await
        .unwrap();
    assert!(html.contains("https://site.test/login/"));
}
