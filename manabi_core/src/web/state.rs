use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bank::load_bank;
use crate::config::Config;
use crate::error::Result;
use crate::ml::Analyzer;
use crate::questions::QuestionBank;
use crate::scores::ScoreLog;
use crate::session::Session;

/// Shared state behind every handler. One adventure session per server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub bank: Arc<QuestionBank>,
    /// Why the bank could not be used, if it could not.
    pub bank_problem: Option<String>,
    pub scores: ScoreLog,
    pub analyzer: Arc<Analyzer>,
    pub session: Arc<Mutex<Session>>,
}

impl AppState {
    pub fn new(config: Config, bank: QuestionBank, analyzer: Analyzer) -> Self {
        let bank_problem = bank
            .is_empty()
            .then(|| format!("No questions found in {}", config.questions_path.display()));
        let scores = ScoreLog::new(&config.scores_path);
        let session = Session::new(config.chapter_size, config.pass_threshold);
        Self {
            config: Arc::new(config),
            bank: Arc::new(bank),
            bank_problem,
            scores,
            analyzer: Arc::new(analyzer),
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Load the bank, score log and models named by `config`. A missing or
    /// empty bank does not stop the server; it is reported on every page.
    pub fn from_config(config: Config) -> Result<Self> {
        let (bank, problem) = match load_bank(&config.questions_path) {
            Ok(bank) => {
                info!(questions = bank.len(), path = %config.questions_path.display(), "question bank loaded");
                (bank, None)
            }
            Err(e) if e.is_data_unavailable() => {
                warn!(error = %e, "question bank unavailable");
                (QuestionBank::default(), Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        let scores = ScoreLog::new(&config.scores_path);
        if let Err(e) = scores.ensure_exists() {
            warn!(error = %e, path = %config.scores_path.display(), "score log not writable");
        }
        let analyzer = Analyzer::load_or_train(&config.models_dir, config.auto_train)?;

        let mut state = Self::new(config, bank, analyzer);
        if problem.is_some() {
            state.bank_problem = problem;
        }
        Ok(state)
    }
}
