//! Route handlers. Every form posts an action and redirects back to `/`,
//! which renders whatever screen the session is on.

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ml::StudentReport;
use crate::progress::topic_breakdown;
use crate::realm::{Difficulty, Topic};
use crate::scores::ScoreRecord;
use crate::session::{Screen, Session};
use crate::web::error::AppError;
use crate::web::render;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlayerForm {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerForm {
    pub choice: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub questions: usize,
    pub bank_available: bool,
    pub weakness_model: bool,
    pub trajectory_model: bool,
    /// Held-out accuracy recorded when each loaded model was trained.
    pub weakness_accuracy: Option<f64>,
    pub trajectory_accuracy: Option<f64>,
}

pub async fn index(State(state): State<AppState>) -> std::result::Result<Response, AppError> {
    if let Some(problem) = &state.bank_problem {
        return Ok(Html(render::unavailable(problem)).into_response());
    }

    let journal_player = {
        let session = state.session.lock();
        (session.screen() == Screen::Journal).then(|| session.player().unwrap_or_default().to_string())
    };
    let journal = match journal_player {
        Some(player) => Some(learner_report(&state, player).await?),
        None => None,
    };

    let mut session = state.session.lock();
    let screen = session.screen();
    if screen == Screen::Journal && journal.is_none() {
        // journal opened while this request was in flight
        return Ok(Redirect::to("/").into_response());
    }
    let notice = session.take_notice();
    let notice = notice.as_deref();
    let page = match screen {
        Screen::Introduction => render::introduction(notice),
        Screen::RealmSelection => render::realm_selection(&session, &state.bank, notice),
        Screen::ChapterSelection => match session.realm() {
            Some(topic) => render::chapter_selection(&session, &state.bank, topic, notice),
            None => render::realm_selection(&session, &state.bank, notice),
        },
        Screen::Question => render::question(&session, notice),
        Screen::ChapterResults => render::chapter_results(&session, notice),
        Screen::Journal => match &journal {
            Some((records, report)) => {
                render::journal(&session, report, records, &topic_breakdown(records), notice)
            }
            None => render::realm_selection(&session, &state.bank, notice),
        },
    };
    Ok(Html(page).into_response())
}

/// Read a learner's score history and build their report on the blocking
/// pool. The session lock is not held meanwhile.
async fn learner_report(
    state: &AppState,
    player: String,
) -> std::result::Result<(Vec<ScoreRecord>, StudentReport), AppError> {
    let state = state.clone();
    let built = tokio::task::spawn_blocking(move || -> Result<(Vec<ScoreRecord>, StudentReport)> {
        let records = state.scores.records_for(&player)?;
        let report = state.analyzer.report(
            &player,
            &records,
            &state.bank,
            state.config.chapter_size,
            state.config.pass_threshold,
        );
        Ok((records, report))
    })
    .await
    .map_err(|e| AppError::internal(format!("report task failed: {e}")))?;
    Ok(built?)
}

/// Apply one session action. Actions that do not fit the current screen are
/// turned into a notice rather than an error page.
fn act(
    state: &AppState,
    action: impl FnOnce(&mut Session, &AppState) -> Result<()>,
) -> std::result::Result<Redirect, AppError> {
    if state.bank_problem.is_some() {
        return Ok(Redirect::to("/"));
    }
    let mut session = state.session.lock();
    match action(&mut session, state) {
        Ok(()) => {}
        Err(Error::Validation(message)) => {
            debug!(%message, "action rejected");
            session.notify(message);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Redirect::to("/"))
}

pub async fn set_player(
    State(state): State<AppState>,
    Form(form): Form<PlayerForm>,
) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, _| session.set_player_name(&form.name))
}

pub async fn enter_realm(
    State(state): State<AppState>,
    Path(topic): Path<String>,
) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, _| session.enter_realm(topic.parse::<Topic>()?))
}

pub async fn leave_realm(State(state): State<AppState>) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, _| session.leave_realm())
}

pub async fn toggle_journal(State(state): State<AppState>) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, _| session.toggle_journal())
}

pub async fn start_chapter(
    State(state): State<AppState>,
    Path(difficulty): Path<String>,
) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, state| {
        session.start_chapter(difficulty.parse::<Difficulty>()?, &state.bank)
    })
}

pub async fn answer(
    State(state): State<AppState>,
    Form(form): Form<AnswerForm>,
) -> std::result::Result<Redirect, AppError> {
    // anything unparseable counts as a wrong answer
    let choice = form.choice.trim().parse::<usize>().unwrap_or(usize::MAX);
    act(&state, |session, _| session.answer(choice).map(|_| ()))
}

pub async fn next_question(State(state): State<AppState>) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, state| {
        session.next_question(&state.bank, &state.scores).map(|_| ())
    })
}

pub async fn retry_chapter(State(state): State<AppState>) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, state| session.retry_chapter(&state.bank))
}

pub async fn leave_chapter(State(state): State<AppState>) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, _| session.leave_chapter())
}

pub async fn reset(State(state): State<AppState>) -> std::result::Result<Redirect, AppError> {
    act(&state, |session, _| {
        session.reset();
        Ok(())
    })
}

/// The current explorer's report as JSON.
pub async fn report(State(state): State<AppState>) -> std::result::Result<Json<StudentReport>, AppError> {
    let player = state
        .session
        .lock()
        .player()
        .map(str::to_string)
        .ok_or_else(|| AppError::not_found("no explorer has started an adventure").json())?;
    let (_, report) = learner_report(&state, player).await.map_err(AppError::json)?;
    Ok(Json(report))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        questions: state.bank.len(),
        bank_available: state.bank_problem.is_none(),
        weakness_model: state.analyzer.has_weakness_model(),
        trajectory_model: state.analyzer.has_trajectory_model(),
        weakness_accuracy: state.analyzer.weakness_accuracy(),
        trajectory_accuracy: state.analyzer.trajectory_accuracy(),
    })
}

pub async fn not_found() -> AppError {
    AppError::not_found("That path leads nowhere in the realms.")
}
