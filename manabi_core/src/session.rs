//! Navigation state of one adventure: screens, the current chapter run and
//! the gamification counters.

use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::progress::{Progress, RunOutcome, PASS_THRESHOLD};
use crate::questions::{check_answer, Question, QuestionBank};
use crate::realm::{chapter_intro, encouragement, Difficulty, Topic};
use crate::scores::{ScoreLog, ScoreRecord};

/// Default number of questions drawn for one run.
pub const DEFAULT_CHAPTER_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Introduction,
    RealmSelection,
    Journal,
    ChapterSelection,
    Question,
    ChapterResults,
}

/// What happened when one question was answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerFeedback {
    pub prompt: String,
    pub chosen: usize,
    pub correct_index: usize,
    pub correct: bool,
    pub xp_earned: u64,
}

/// One pass through a chapter's shuffled question set.
#[derive(Debug, Clone)]
pub struct ChapterRun {
    pub topic: Topic,
    pub difficulty: Difficulty,
    pub intro: String,
    questions: Vec<Question>,
    position: usize,
    answers: Vec<AnswerFeedback>,
    started: Instant,
}

impl ChapterRun {
    fn new(topic: Topic, difficulty: Difficulty, intro: String, questions: Vec<Question>) -> Self {
        Self {
            topic,
            difficulty,
            intro,
            questions,
            position: 0,
            answers: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.position)
    }

    /// Zero-based index of the current question.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Feedback for the current question, once it has been answered.
    pub fn feedback(&self) -> Option<&AnswerFeedback> {
        self.answers.get(self.position)
    }

    pub fn answers(&self) -> &[AnswerFeedback] {
        &self.answers
    }

    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|a| a.correct).count()
    }

    fn is_last(&self) -> bool {
        self.position + 1 >= self.questions.len()
    }
}

/// The single in-memory adventure.
#[derive(Debug, Clone)]
pub struct Session {
    player: Option<String>,
    screen: Screen,
    realm: Option<Topic>,
    run: Option<ChapterRun>,
    progress: Progress,
    last_outcome: Option<RunOutcome>,
    message: Option<String>,
    notice: Option<String>,
    chapter_size: usize,
    pass_threshold: f64,
    rng: ChaCha8Rng,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_CHAPTER_SIZE, PASS_THRESHOLD)
    }
}

impl Session {
    pub fn new(chapter_size: usize, pass_threshold: f64) -> Self {
        Self::with_rng(chapter_size, pass_threshold, ChaCha8Rng::from_entropy())
    }

    /// Deterministic session, for tests and replays.
    pub fn with_seed(chapter_size: usize, pass_threshold: f64, seed: u64) -> Self {
        Self::with_rng(chapter_size, pass_threshold, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(chapter_size: usize, pass_threshold: f64, rng: ChaCha8Rng) -> Self {
        Self {
            player: None,
            screen: Screen::Introduction,
            realm: None,
            run: None,
            progress: Progress::new(),
            last_outcome: None,
            message: None,
            notice: None,
            chapter_size: chapter_size.max(1),
            pass_threshold,
            rng,
        }
    }

    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn realm(&self) -> Option<Topic> {
        self.realm
    }

    pub fn run(&self) -> Option<&ChapterRun> {
        self.run.as_ref()
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn last_outcome(&self) -> Option<&RunOutcome> {
        self.last_outcome.as_ref()
    }

    /// Mentor message for the last finished run.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// One-shot notice for the next rendered page.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn notify(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    fn require(&self, allowed: &[Screen], action: &str) -> Result<()> {
        if allowed.contains(&self.screen) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "cannot {action} from the {:?} screen",
                self.screen
            )))
        }
    }

    pub fn set_player_name(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("explorer name must not be blank".to_string()));
        }
        self.require(&[Screen::Introduction], "choose a name")?;
        info!(player = name, "adventure started");
        self.player = Some(name.to_string());
        self.screen = Screen::RealmSelection;
        Ok(())
    }

    pub fn enter_realm(&mut self, topic: Topic) -> Result<()> {
        self.require(&[Screen::RealmSelection, Screen::Journal], "enter a realm")?;
        self.realm = Some(topic);
        self.screen = Screen::ChapterSelection;
        Ok(())
    }

    pub fn leave_realm(&mut self) -> Result<()> {
        self.require(&[Screen::ChapterSelection], "leave the realm")?;
        self.realm = None;
        self.screen = Screen::RealmSelection;
        Ok(())
    }

    pub fn toggle_journal(&mut self) -> Result<()> {
        self.screen = match self.screen {
            Screen::RealmSelection => Screen::Journal,
            Screen::Journal => Screen::RealmSelection,
            other => {
                return Err(Error::Validation(format!(
                    "cannot open the journal from the {other:?} screen"
                )))
            }
        };
        Ok(())
    }

    /// Draw a shuffled question set and begin a run.
    pub fn start_chapter(&mut self, difficulty: Difficulty, bank: &QuestionBank) -> Result<()> {
        self.require(&[Screen::ChapterSelection], "start a chapter")?;
        let topic = self
            .realm
            .ok_or_else(|| Error::Validation("no realm selected".to_string()))?;
        self.begin(topic, difficulty, bank)
    }

    fn begin(&mut self, topic: Topic, difficulty: Difficulty, bank: &QuestionBank) -> Result<()> {
        let questions = bank.chapter_questions(topic, difficulty, self.chapter_size, &mut self.rng);
        if questions.is_empty() {
            return Err(Error::Validation(format!(
                "{} has no questions yet",
                topic.realm().chapter_name(difficulty)
            )));
        }
        let player = self.player.as_deref().unwrap_or("Explorer");
        let intro = chapter_intro(topic, difficulty, player);
        info!(%topic, %difficulty, questions = questions.len(), "chapter run started");

        self.progress.begin_run(topic, difficulty);
        self.run = Some(ChapterRun::new(topic, difficulty, intro, questions));
        self.last_outcome = None;
        self.message = None;
        self.screen = Screen::Question;
        Ok(())
    }

    /// Answer the current question. A second answer to the same question is
    /// ignored; an out-of-range index is wrong.
    pub fn answer(&mut self, index: usize) -> Result<Option<&AnswerFeedback>> {
        self.require(&[Screen::Question], "answer")?;
        let run = self
            .run
            .as_mut()
            .ok_or_else(|| Error::Validation("no chapter in progress".to_string()))?;
        if run.answers.len() > run.position {
            return Ok(None);
        }
        let Some(question) = run.questions.get(run.position) else {
            return Ok(None);
        };

        let correct = check_answer(question, index);
        let xp_earned = self.progress.record_answer(run.topic, run.difficulty, correct);
        run.answers.push(AnswerFeedback {
            prompt: question.prompt.clone(),
            chosen: index,
            correct_index: question.correct_index,
            correct,
            xp_earned,
        });
        Ok(run.answers.last())
    }

    /// Move past an answered question. After the last one the run is
    /// finished and logged, and the outcome is returned.
    pub fn next_question(&mut self, bank: &QuestionBank, log: &ScoreLog) -> Result<Option<RunOutcome>> {
        self.require(&[Screen::Question], "continue")?;
        let run = self
            .run
            .as_mut()
            .ok_or_else(|| Error::Validation("no chapter in progress".to_string()))?;
        if run.answers.len() <= run.position {
            return Err(Error::Validation("answer the current question first".to_string()));
        }
        if !run.is_last() {
            run.position += 1;
            return Ok(None);
        }

        let (topic, difficulty) = (run.topic, run.difficulty);
        let elapsed = run.started.elapsed().as_secs();
        let outcome = self
            .progress
            .finish_run(topic, difficulty, bank, self.chapter_size, self.pass_threshold);
        info!(
            %topic,
            %difficulty,
            correct = outcome.correct_answers,
            total = outcome.total_questions,
            passed = outcome.passed,
            xp = outcome.xp_earned,
            "chapter run finished"
        );

        if let Some(player) = self.player.as_deref() {
            let record = ScoreRecord::new(
                player,
                topic,
                difficulty,
                outcome.correct_answers,
                outcome.total_questions,
                elapsed,
            )
            .with_rewards(outcome.xp_earned, self.progress.quest_streak);
            if let Err(e) = log.append(&record) {
                warn!(error = %e, path = %log.path().display(), "could not write score log");
                self.notice = Some("Your journal scroll could not be saved this time.".to_string());
            }
        }

        self.message = Some(encouragement(
            topic,
            outcome.accuracy_percent,
            outcome.passed,
            &mut self.rng,
        ));
        self.last_outcome = Some(outcome);
        self.screen = Screen::ChapterResults;
        Ok(Some(outcome))
    }

    /// Run the same chapter again with a fresh shuffle.
    pub fn retry_chapter(&mut self, bank: &QuestionBank) -> Result<()> {
        self.require(&[Screen::ChapterResults, Screen::Question], "retry")?;
        let (topic, difficulty) = self
            .run
            .as_ref()
            .map(|r| (r.topic, r.difficulty))
            .ok_or_else(|| Error::Validation("no chapter to retry".to_string()))?;
        self.begin(topic, difficulty, bank)
    }

    pub fn leave_chapter(&mut self) -> Result<()> {
        self.require(&[Screen::Question, Screen::ChapterResults], "leave the chapter")?;
        self.run = None;
        self.screen = Screen::ChapterSelection;
        Ok(())
    }

    /// Start a brand-new adventure.
    pub fn reset(&mut self) {
        let rng = self.rng.clone();
        *self = Self::with_rng(self.chapter_size, self.pass_threshold, rng);
    }
}
