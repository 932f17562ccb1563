//! ManabiFun core - quiz engine, score log, learner analytics and the local
//! web front end for the English adventure.
//!
//! Provides CSV/Excel question-bank loading, chapter runs with XP and
//! streaks, random-forest weakness and trajectory prediction, and an axum
//! server rendering the adventure screens.

pub mod bank;
pub mod config;
pub mod error;
pub mod logging;
pub mod ml;
pub mod progress;
pub mod questions;
pub mod realm;
pub mod scores;
pub mod session;
pub mod web;

pub use bank::{load_bank, write_csv};
pub use config::Config;
pub use error::{Error, Result};
pub use ml::{Analyzer, ModelArtifact, ModelKind, StudentReport};
pub use progress::{AttemptStats, Progress, RunOutcome};
pub use questions::{check_answer, fisher_yates_shuffle, Question, QuestionBank};
pub use realm::{Difficulty, Topic};
pub use scores::{ScoreLog, ScoreRecord};
pub use session::{Screen, Session};
