//! Append-only CSV score log, one row per completed chapter run

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::realm::{Difficulty, Topic};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One completed chapter run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub learner: String,
    #[serde(with = "timestamp")]
    pub timestamp: NaiveDateTime,
    pub topic: Topic,
    pub difficulty: Difficulty,
    pub correct_answers: u32,
    pub total_questions: u32,
    /// Percentage in `0..=100`.
    pub score: f64,
    pub time_spent_secs: u64,
    pub xp_earned: u64,
    pub streak: u32,
}

impl ScoreRecord {
    pub fn new(
        learner: impl Into<String>,
        topic: Topic,
        difficulty: Difficulty,
        correct_answers: u32,
        total_questions: u32,
        time_spent_secs: u64,
    ) -> Self {
        let score = if total_questions > 0 {
            correct_answers as f64 / total_questions as f64 * 100.0
        } else {
            0.0
        };
        Self {
            learner: learner.into(),
            timestamp: Local::now().naive_local(),
            topic,
            difficulty,
            correct_answers,
            total_questions,
            score,
            time_spent_secs,
            xp_earned: 0,
            streak: 0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_rewards(mut self, xp_earned: u64, streak: u32) -> Self {
        self.xp_earned = xp_earned;
        self.streak = streak;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.learner.trim().is_empty() {
            return Err(Error::Validation("score record has no learner name".to_string()));
        }
        if self.total_questions == 0 {
            return Err(Error::Validation("score record has no questions".to_string()));
        }
        if self.correct_answers > self.total_questions {
            return Err(Error::Validation(format!(
                "{} correct answers out of {} questions",
                self.correct_answers, self.total_questions
            )));
        }
        Ok(())
    }
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Handle to the score log file.
#[derive(Debug, Clone)]
pub struct ScoreLog {
    path: PathBuf,
}

impl ScoreLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with its header row if it does not exist yet.
    pub fn ensure_exists(&self) -> Result<()> {
        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        if !needs_header {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = WriterBuilder::new().from_path(&self.path)?;
        writer.write_record([
            "learner",
            "timestamp",
            "topic",
            "difficulty",
            "correct_answers",
            "total_questions",
            "score",
            "time_spent_secs",
            "xp_earned",
            "streak",
        ])?;
        writer.flush()?;
        Ok(())
    }

    /// Append one validated record.
    pub fn append(&self, record: &ScoreRecord) -> Result<()> {
        record.validate()?;
        self.ensure_exists()?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;

        debug!(
            learner = %record.learner,
            topic = %record.topic,
            difficulty = %record.difficulty,
            score = record.score,
            "score recorded"
        );
        Ok(())
    }

    /// Every readable record. A missing or empty file is an empty log.
    pub fn load(&self) -> Result<Vec<ScoreRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let mut records = Vec::new();
        for (offset, result) in reader.deserialize::<ScoreRecord>().enumerate() {
            match result.map_err(Error::from).and_then(|r| r.validate().map(|_| r)) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = offset + 2, error = %e, "skipping unreadable score row"),
            }
        }
        Ok(records)
    }

    /// Records belonging to one learner (case-insensitive, trimmed).
    pub fn records_for(&self, learner: &str) -> Result<Vec<ScoreRecord>> {
        let wanted = learner.trim().to_lowercase();
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| r.learner.trim().to_lowercase() == wanted)
            .collect())
    }
}
