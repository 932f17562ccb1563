use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use manabi_core::ml::Analyzer;
use manabi_core::web::{router, AppState};
use manabi_core::{Config, Difficulty, Question, QuestionBank, ScoreLog, Topic};

fn bank() -> QuestionBank {
    let prompts = [
        "What is the past tense of 'run'?",
        "Choose the plural form of 'child':",
        "Which sentence is correct?",
    ];
    let questions = prompts
        .iter()
        .map(|p| {
            Question::new(
                Topic::Grammar,
                p.to_string(),
                ["one".into(), "two".into(), "three".into(), "four".into()],
                0,
                Difficulty::Easy,
            )
            .unwrap()
        })
        .collect();
    QuestionBank::new(questions)
}

fn state(dir: &TempDir, bank: QuestionBank) -> AppState {
    state_with(dir, bank, Config::default())
}

fn state_with(dir: &TempDir, bank: QuestionBank, config: Config) -> AppState {
    let config = Config {
        scores_path: dir.path().join("scores.csv"),
        models_dir: dir.path().join("models"),
        ..config
    };
    AppState::new(config, bank, Analyzer::untrained())
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post(app: &Router, uri: &str, form: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn page(app: &Router) -> String {
    let response = get(app, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    body_text(response).await
}

fn assert_redirect_home(response: &Response) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn health_reports_bank_and_models() {
    let dir = TempDir::new().unwrap();
    let app = router(state(&dir, bank()));
    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["questions"], 3);
    assert_eq!(json["weakness_model"], false);
    assert!(json["weakness_accuracy"].is_null());
    assert!(json["trajectory_accuracy"].is_null());
}

#[tokio::test]
async fn full_chapter_run_is_logged() {
    let dir = TempDir::new().unwrap();
    let state = state(&dir, bank());
    let scores = state.scores.clone();
    let app = router(state);

    assert!(page(&app).await.contains("What shall we call you"));

    assert_redirect_home(&post(&app, "/player", "name=Alex").await);
    let html = page(&app).await;
    assert!(html.contains("Choose your realm"));
    assert!(html.contains("Alex"));

    assert_redirect_home(&post(&app, "/realm/grammar", "").await);
    assert!(page(&app).await.contains("Your mentor"));

    assert_redirect_home(&post(&app, "/chapter/easy", "").await);
    assert!(page(&app).await.contains("Question 1 of 3"));

    for _ in 0..3 {
        assert_redirect_home(&post(&app, "/answer", "choice=0").await);
        assert!(page(&app).await.contains("Correct!"));
        assert_redirect_home(&post(&app, "/next", "").await);
    }
    let html = page(&app).await;
    assert!(html.contains("3 / 3 correct"));
    assert!(html.contains("Chapter passed"));

    let records = ScoreLog::new(scores.path()).load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].learner, "Alex");
    assert_eq!(records[0].correct_answers, 3);

    let response = get(&app, "/api/report").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["student_name"], "Alex");
    assert_eq!(json["summary"]["total_chapters"], 1);
}

#[tokio::test]
async fn short_chapter_size_masters_the_realm() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        chapter_size: 2,
        ..Config::default()
    };
    let app = router(state_with(&dir, bank(), config));
    post(&app, "/player", "name=Alex").await;
    post(&app, "/realm/grammar", "").await;
    post(&app, "/chapter/easy", "").await;
    assert!(page(&app).await.contains("Question 1 of 2"));

    for _ in 0..2 {
        post(&app, "/answer", "choice=0").await;
        post(&app, "/next", "").await;
    }
    let html = page(&app).await;
    assert!(html.contains("2 / 2 correct"));
    assert!(html.contains("Chapter passed"));

    let response = get(&app, "/api/report").await;
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["summary"]["realms_mastered"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn journal_renders_alongside_other_requests() {
    let dir = TempDir::new().unwrap();
    let app = router(state(&dir, bank()));
    post(&app, "/player", "name=Alex").await;
    post(&app, "/journal", "").await;

    let pages = (0..8).map(|_| {
        let app = app.clone();
        tokio::spawn(async move { page(&app).await })
    });
    let reports = (0..8).map(|_| {
        let app = app.clone();
        tokio::spawn(async move { get(&app, "/api/report").await.status() })
    });
    let (pages, reports): (Vec<_>, Vec<_>) = (pages.collect(), reports.collect());
    for handle in pages {
        assert!(handle.await.unwrap().contains("Your journal is empty"));
    }
    for handle in reports {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
}

#[tokio::test]
async fn garbage_answer_counts_as_wrong() {
    let dir = TempDir::new().unwrap();
    let app = router(state(&dir, bank()));
    post(&app, "/player", "name=Sam").await;
    post(&app, "/realm/grammar", "").await;
    post(&app, "/chapter/easy", "").await;

    assert_redirect_home(&post(&app, "/answer", "choice=banana").await);
    assert!(page(&app).await.contains("Not quite"));
}

#[tokio::test]
async fn invalid_actions_become_notices() {
    let dir = TempDir::new().unwrap();
    let app = router(state(&dir, bank()));
    post(&app, "/player", "name=Alex").await;

    assert_redirect_home(&post(&app, "/realm/dragons", "").await);
    let html = page(&app).await;
    assert!(html.contains("unknown topic"));
    assert!(html.contains("Choose your realm"));

    assert_redirect_home(&post(&app, "/next", "").await);
    assert!(page(&app).await.contains("cannot continue"));
}

#[tokio::test]
async fn journal_toggles_and_renders() {
    let dir = TempDir::new().unwrap();
    let app = router(state(&dir, bank()));
    post(&app, "/player", "name=Alex").await;

    post(&app, "/journal", "").await;
    assert!(page(&app).await.contains("Your journal is empty"));
    post(&app, "/journal", "").await;
    assert!(page(&app).await.contains("Choose your realm"));
}

#[tokio::test]
async fn empty_bank_shows_friendly_page() {
    let dir = TempDir::new().unwrap();
    let app = router(state(&dir, QuestionBank::default()));
    let html = page(&app).await;
    assert!(html.contains("The scrolls are missing"));

    assert_redirect_home(&post(&app, "/player", "name=Alex").await);
    assert!(page(&app).await.contains("The scrolls are missing"));
}

#[tokio::test]
async fn report_without_player_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = router(state(&dir, bank()));
    let response = get(&app, "/api/report").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = router(state(&dir, bank()));
    let response = get(&app, "/dungeon").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
