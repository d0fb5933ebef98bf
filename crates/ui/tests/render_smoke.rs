use chrono::Duration;
use services::client::{LoginPrompt, ProgressView};
use survey_core::model::{
    FormId, PageDescriptor, ProgressState, Question, QuestionId, ResponseGroups, ResponseView,
    SurveyResponse, Token,
};
use survey_core::time::fixed_now;
use ui::vm::map_dashboard;

fn state_with(pages: &[(&str, Option<&str>, i64)]) -> ProgressState {
    let mut state = ProgressState::new();
    for (url, title, minutes) in pages {
        let mut page = PageDescriptor::new(*url);
        if let Some(title) = title {
            page = page.with_title(*title);
        }
        state.record(&page, None, fixed_now() + Duration::minutes(*minutes));
    }
    state
}

#[test]
fn empty_dashboard_shows_empty_state() {
    let html = ui::render_dashboard(&ProgressView::default());
    assert!(html.contains("No learning progress yet"), "missing empty state in {html}");
    assert!(!html.contains("Recently Visited Modules"));
    assert!(!html.contains("completed"));
}

#[test]
fn single_visit_has_no_recent_list() {
    let view = ProgressView::from_state(&state_with(&[("/modules-home/module-4/", None, 0)]));
    let html = ui::render_dashboard(&view);
    assert!(html.contains("Module 4"), "missing fallback title in {html}");
    assert!(html.contains("1 item completed"));
    assert!(!html.contains("Recently Visited Modules"));
}

#[test]
fn several_visits_list_most_recent_first() {
    let view = ProgressView::from_state(&state_with(&[
        ("/module-1/", Some("Sleep basics"), 0),
        ("/module-2/", Some("Wind down"), 10),
    ]));
    let vm = map_dashboard(&view);
    assert_eq!(vm.last_visited.as_ref().unwrap().title, "Wind down");
    assert_eq!(vm.recent.len(), 2);

    let html = ui::render_dashboard(&view);
    assert!(html.contains("2 items completed"));
    assert!(html.contains("Recently Visited Modules"));
    let newest = html.find("Wind down").unwrap();
    let older = html.rfind("Sleep basics").unwrap();
    assert!(newest < older);
}

#[test]
fn denied_prompt_uses_server_markup_or_fallback() {
    let server = ui::render_login_message("https://site.test/login/");
    assert!(server.contains("Please Log In to View"));
    assert!(server.contains("https://site.test/login/"));
    assert_eq!(ui::render_denied(&LoginPrompt::Server(server.clone())), server);

    let fallback = ui::render_denied(&LoginPrompt::Fallback {
        home_url: "https://site.test/".into(),
    });
    assert!(fallback.contains("Please Log In"));
    assert!(fallback.contains("href=\"https://site.test/\""));
}

#[test]
fn token_entry_shows_inline_error() {
    let html = ui::render_token_entry("/login", Some("Invalid or expired ID"));
    assert!(html.contains("maxlength=\"5\""));
    assert!(html.contains("Invalid or expired ID"));
    assert!(!ui::render_token_entry("/login", None).contains("token-error"));
}

#[test]
fn responses_render_grouped_by_parent_and_module() {
    let token = Token::parse("A1234").unwrap();
    let question = Question::new(QuestionId::new(1), "How did you sleep?").in_module("Week 1", "Rest");
    let row = |id: u64, answer: &str| SurveyResponse {
        question_id: QuestionId::new(id),
        token: token.clone(),
        form_id: FormId::default(),
        answer: answer.to_owned(),
        created_at: fixed_now(),
    };
    let groups = ResponseGroups::group([
        ResponseView::from_parts(row(1, "Well"), Some(&question)),
        ResponseView::from_parts(row(7, "Walking"), None),
    ]);

    let html = ui::render_responses(&groups);
    assert!(html.contains("Week 1"));
    assert!(html.contains("How did you sleep?"));
    assert!(html.contains("Question 7"));
    assert!(html.find("General").unwrap() < html.find("Week 1").unwrap());

    let empty = ui::render_responses(&ResponseGroups::default());
    assert!(empty.contains("No responses found."));
}
