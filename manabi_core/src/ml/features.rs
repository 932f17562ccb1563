//! Feature engineering over a learner's score history.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::realm::{Difficulty, Topic};
use crate::scores::ScoreRecord;

/// Column order of the weakness classifier input.
pub const WEAKNESS_FEATURES: [&str; 11] = [
    "grammar_score",
    "articles_score",
    "synonyms_score",
    "antonyms_score",
    "sentences_score",
    "avg_time_per_question",
    "chapters_completed",
    "session_frequency",
    "score_variance",
    "overall_accuracy",
    "total_questions",
];

/// Column order of the trajectory classifier input.
pub const TRAJECTORY_FEATURES: [&str; 4] = [
    "current_score",
    "chapters_completed",
    "elapsed_time",
    "attempt_count",
];

/// Seconds per question assumed when no timing was recorded.
pub const DEFAULT_SECONDS_PER_QUESTION: f64 = 12.0;
/// Seconds per chapter run assumed when no timing was recorded.
pub const DEFAULT_SECONDS_PER_RUN: f64 = 180.0;

/// Latest score of one chapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChapterScore {
    pub topic: Topic,
    pub difficulty: Difficulty,
    /// Latest run's accuracy in `[0, 1]`.
    pub score: f64,
    pub attempts: u32,
}

/// Everything the classifiers and the report need to know about a learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnerFeatures {
    /// Indexed by [`Topic::index`].
    pub topic_scores: [f64; 5],
    pub avg_time_per_question: f64,
    pub chapters_completed: usize,
    /// Distinct active days per week, in `[0, 7]`.
    pub session_frequency: f64,
    pub score_variance: f64,
    pub overall_accuracy: f64,
    pub total_questions: u64,
    pub total_runs: usize,
    pub mean_run_secs: f64,
    pub attempts_per_chapter: f64,
    pub chapters: Vec<ChapterScore>,
}

impl LearnerFeatures {
    /// Build features from one learner's records. `None` when nothing has
    /// been recorded yet.
    pub fn from_records(records: &[ScoreRecord]) -> Option<Self> {
        let total_questions: u64 = records.iter().map(|r| r.total_questions as u64).sum();
        if records.is_empty() || total_questions == 0 {
            return None;
        }
        let total_correct: u64 = records.iter().map(|r| r.correct_answers as u64).sum();
        let overall_accuracy = total_correct as f64 / total_questions as f64;

        let mut latest: BTreeMap<(Topic, Difficulty), (NaiveDateTime, ChapterScore)> = BTreeMap::new();
        for r in records {
            let score = r.correct_answers as f64 / r.total_questions as f64;
            let entry = latest.entry((r.topic, r.difficulty)).or_insert((
                r.timestamp,
                ChapterScore {
                    topic: r.topic,
                    difficulty: r.difficulty,
                    score,
                    attempts: 0,
                },
            ));
            entry.1.attempts += 1;
            if r.timestamp >= entry.0 {
                entry.0 = r.timestamp;
                entry.1.score = score;
            }
        }
        let chapters: Vec<ChapterScore> = latest.into_values().map(|(_, c)| c).collect();
        let scores: Vec<f64> = chapters.iter().map(|c| c.score).collect();
        let chapter_mean = mean(&scores);

        let mut topic_scores = [chapter_mean; 5];
        for topic in Topic::ALL {
            let of_topic: Vec<f64> = chapters
                .iter()
                .filter(|c| c.topic == topic)
                .map(|c| c.score)
                .collect();
            if !of_topic.is_empty() {
                topic_scores[topic.index()] = mean(&of_topic);
            }
        }

        let total_secs: u64 = records.iter().map(|r| r.time_spent_secs).sum();
        let avg_time_per_question = if total_secs > 0 {
            total_secs as f64 / total_questions as f64
        } else {
            DEFAULT_SECONDS_PER_QUESTION
        };
        let timed: Vec<f64> = records
            .iter()
            .filter(|r| r.time_spent_secs > 0)
            .map(|r| r.time_spent_secs as f64)
            .collect();
        let mean_run_secs = if timed.is_empty() {
            DEFAULT_SECONDS_PER_RUN
        } else {
            mean(&timed)
        };

        Some(Self {
            topic_scores,
            avg_time_per_question,
            chapters_completed: chapters.len(),
            session_frequency: session_frequency(records),
            score_variance: population_variance(&scores),
            overall_accuracy,
            total_questions,
            total_runs: records.len(),
            mean_run_secs,
            attempts_per_chapter: records.len() as f64 / chapters.len() as f64,
            chapters,
        })
    }

    pub fn topic_score(&self, topic: Topic) -> f64 {
        self.topic_scores[topic.index()]
    }

    /// `1 - 2σ` of the chapter scores, clamped to `[0, 1]`.
    pub fn consistency(&self) -> f64 {
        (1.0 - 2.0 * self.score_variance.sqrt()).clamp(0.0, 1.0)
    }

    /// Input row for the weakness classifier, in [`WEAKNESS_FEATURES`] order.
    pub fn weakness_vector(&self) -> Vec<f64> {
        let mut row = self.topic_scores.to_vec();
        row.extend([
            self.avg_time_per_question,
            self.chapters_completed as f64,
            self.session_frequency,
            self.score_variance,
            self.overall_accuracy,
            self.total_questions as f64,
        ]);
        row
    }

    /// Input row for the trajectory classifier, in [`TRAJECTORY_FEATURES`] order.
    pub fn trajectory_vector(&self) -> Vec<f64> {
        vec![
            self.overall_accuracy,
            self.chapters_completed as f64,
            self.mean_run_secs,
            self.attempts_per_chapter,
        ]
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population variance; zero for fewer than two values.
pub(crate) fn population_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

fn session_frequency(records: &[ScoreRecord]) -> f64 {
    let days: BTreeSet<_> = records.iter().map(|r| r.timestamp.date()).collect();
    let (Some(first), Some(last)) = (days.first(), days.last()) else {
        return 0.0;
    };
    let span_days = (*last - *first).num_days() + 1;
    let weeks = span_days.max(7) as f64 / 7.0;
    (days.len() as f64 / weeks).clamp(0.0, 7.0)
}
