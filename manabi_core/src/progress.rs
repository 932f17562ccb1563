//! Progress tracking - attempt statistics, chapter mastery and XP

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::questions::QuestionBank;
use crate::realm::{Difficulty, Topic};
use crate::scores::ScoreRecord;

/// XP for each correct answer
pub const XP_CORRECT_ANSWER: u64 = 15;
/// XP for passing a chapter
pub const XP_CHAPTER_PASS: u64 = 150;
/// XP for mastering every chapter of a realm
pub const XP_REALM_MASTERY: u64 = 500;
/// XP needed per explorer level
pub const XP_PER_LEVEL: u64 = 500;

/// Default pass threshold for a chapter, in percent.
pub const PASS_THRESHOLD: f64 = 89.0;
/// Questions a chapter run needs before it can count as passed.
pub const MIN_PASS_QUESTIONS: u32 = 10;

/// Aggregated attempt statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptStats {
    pub total_attempts: u64,
    pub total_questions: u64,
    pub correct_answers: u64,
    pub incorrect_answers: u64,
    pub accuracy_percent: f64,
}

impl AttemptStats {
    /// Fold records into totals. Accuracy is `Σ correct / Σ total`, so the
    /// result does not depend on record order.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ScoreRecord>) -> Self {
        let (attempts, total, correct) = records.into_iter().fold((0u64, 0u64, 0u64), |acc, r| {
            (
                acc.0 + 1,
                acc.1 + r.total_questions as u64,
                acc.2 + r.correct_answers as u64,
            )
        });
        Self::from_totals(attempts, total, correct)
    }

    fn from_totals(total_attempts: u64, total_questions: u64, correct_answers: u64) -> Self {
        let accuracy_percent = if total_questions > 0 {
            correct_answers as f64 / total_questions as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_attempts,
            total_questions,
            correct_answers,
            incorrect_answers: total_questions - correct_answers.min(total_questions),
            accuracy_percent,
        }
    }

    pub fn merge(&self, other: &AttemptStats) -> AttemptStats {
        Self::from_totals(
            self.total_attempts + other.total_attempts,
            self.total_questions + other.total_questions,
            self.correct_answers + other.correct_answers,
        )
    }

    /// Accuracy as a fraction in `[0, 1]`.
    pub fn accuracy(&self) -> f64 {
        self.accuracy_percent / 100.0
    }
}

/// Per-topic statistics, every topic present.
pub fn topic_breakdown(records: &[ScoreRecord]) -> BTreeMap<Topic, AttemptStats> {
    Topic::ALL
        .iter()
        .map(|&t| (t, AttemptStats::from_records(records.iter().filter(|r| r.topic == t))))
        .collect()
}

/// Pass rule for a chapter run.
///
/// A run needs `min(10, available, chapter_size)` answered questions and an
/// accuracy of at least `threshold` percent. `available` counts the questions
/// in the chapter; `chapter_size` caps how many one run draws.
pub fn is_chapter_passed(
    correct: u32,
    total: u32,
    available: usize,
    chapter_size: usize,
    threshold: f64,
) -> bool {
    if total == 0 {
        return false;
    }
    let drawable = u32::try_from(available.min(chapter_size)).unwrap_or(u32::MAX);
    let required = MIN_PASS_QUESTIONS.min(drawable).max(1);
    let accuracy = correct as f64 / total as f64 * 100.0;
    total >= required && accuracy >= threshold
}

/// Explorer level for a given XP total.
pub fn level_for_xp(xp: u64) -> u64 {
    1 + xp / XP_PER_LEVEL
}

pub fn rank_title(level: u64) -> &'static str {
    match level {
        0 | 1 => "Curious Apprentice",
        2 | 3 => "Trail Scout",
        4 | 5 => "Realm Ranger",
        6..=8 => "Word Warden",
        _ => "Grand Lexicon Sage",
    }
}

/// Statistics of one chapter inside a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterStats {
    pub correct_answers: u32,
    pub total_questions: u32,
    pub attempts: u32,
    pub passed: bool,
}

impl ChapterStats {
    pub fn accuracy_percent(&self) -> f64 {
        if self.total_questions == 0 {
            0.0
        } else {
            self.correct_answers as f64 / self.total_questions as f64 * 100.0
        }
    }
}

/// Result of finishing a chapter run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunOutcome {
    pub topic: Topic,
    pub difficulty: Difficulty,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub accuracy_percent: f64,
    pub passed: bool,
    pub realm_mastered: bool,
    /// XP earned during the run, bonuses included.
    pub xp_earned: u64,
}

/// Gamification state of one adventure.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub total_xp: u64,
    pub quest_streak: u32,
    pub best_streak: u32,
    chapters: BTreeMap<(Topic, Difficulty), ChapterStats>,
    mastered: BTreeSet<Topic>,
    run_xp: u64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chapter(&self, topic: Topic, difficulty: Difficulty) -> ChapterStats {
        self.chapters.get(&(topic, difficulty)).copied().unwrap_or_default()
    }

    pub fn level(&self) -> u64 {
        level_for_xp(self.total_xp)
    }

    pub fn mastered_realms(&self) -> &BTreeSet<Topic> {
        &self.mastered
    }

    pub fn is_realm_mastered(&self, topic: Topic) -> bool {
        self.mastered.contains(&topic)
    }

    /// Begin a new run of a chapter: run counters reset, attempts+1.
    pub fn begin_run(&mut self, topic: Topic, difficulty: Difficulty) {
        let stats = self.chapters.entry((topic, difficulty)).or_default();
        stats.correct_answers = 0;
        stats.total_questions = 0;
        stats.attempts += 1;
        self.run_xp = 0;
    }

    /// Record one answer of the current run; returns the XP it earned.
    pub fn record_answer(&mut self, topic: Topic, difficulty: Difficulty, correct: bool) -> u64 {
        let stats = self.chapters.entry((topic, difficulty)).or_default();
        stats.total_questions += 1;
        if correct {
            stats.correct_answers += 1;
            self.quest_streak += 1;
            self.best_streak = self.best_streak.max(self.quest_streak);
            self.award(XP_CORRECT_ANSWER)
        } else {
            self.quest_streak = 0;
            0
        }
    }

    fn award(&mut self, xp: u64) -> u64 {
        self.total_xp += xp;
        self.run_xp += xp;
        xp
    }

    /// Close the current run, award chapter and realm bonuses.
    pub fn finish_run(
        &mut self,
        topic: Topic,
        difficulty: Difficulty,
        bank: &QuestionBank,
        chapter_size: usize,
        threshold: f64,
    ) -> RunOutcome {
        let available = bank.chapter_size(topic, difficulty);
        let stats = self.chapters.entry((topic, difficulty)).or_default();
        let passed = is_chapter_passed(
            stats.correct_answers,
            stats.total_questions,
            available,
            chapter_size,
            threshold,
        );
        let first_pass = passed && !stats.passed;
        stats.passed |= passed;
        let (correct_answers, total_questions, accuracy_percent) =
            (stats.correct_answers, stats.total_questions, stats.accuracy_percent());

        if first_pass {
            self.award(XP_CHAPTER_PASS);
        }

        let mut realm_mastered = false;
        if first_pass && !self.mastered.contains(&topic) {
            let chapters = bank.available_chapters(topic);
            if !chapters.is_empty() && chapters.iter().all(|&d| self.chapter(topic, d).passed) {
                self.mastered.insert(topic);
                self.award(XP_REALM_MASTERY);
                realm_mastered = true;
            }
        }

        RunOutcome {
            topic,
            difficulty,
            correct_answers,
            total_questions,
            accuracy_percent,
            passed,
            realm_mastered,
            xp_earned: self.run_xp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::Question;

    fn record(topic: Topic, correct: u32, total: u32) -> ScoreRecord {
        ScoreRecord::new("Alex", topic, Difficulty::Easy, correct, total, 60)
    }

    fn bank_with(chapters: &[(Topic, Difficulty, usize)]) -> QuestionBank {
        let mut qs = Vec::new();
        let mut n = 0;
        for &(topic, difficulty, count) in chapters {
            for _ in 0..count {
                n += 1;
                qs.push(
                    Question::new(
                        topic,
                        format!("Q{n}"),
                        ["a".into(), "b".into(), "c".into(), "d".into()],
                        0,
                        difficulty,
                    )
                    .unwrap(),
                );
            }
        }
        QuestionBank::new(qs)
    }

    #[test]
    fn accuracy_is_ratio_of_sums() {
        let records = vec![
            record(Topic::Grammar, 1, 2),
            record(Topic::Grammar, 9, 10),
            record(Topic::Articles, 0, 3),
        ];
        let stats = AttemptStats::from_records(&records);
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.total_questions, 15);
        assert_eq!(stats.correct_answers, 10);
        assert_eq!(stats.incorrect_answers, 5);
        assert!((stats.accuracy_percent - 10.0 / 15.0 * 100.0).abs() < 1e-9);

        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(AttemptStats::from_records(&reversed), stats);

        let merged = AttemptStats::from_records(&records[..1]).merge(&AttemptStats::from_records(&records[1..]));
        assert_eq!(merged, stats);
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = AttemptStats::from_records(&[]);
        assert_eq!(stats, AttemptStats::default());
    }

    #[test]
    fn breakdown_covers_every_topic() {
        let records = vec![record(Topic::Synonyms, 3, 4)];
        let breakdown = topic_breakdown(&records);
        assert_eq!(breakdown.len(), 5);
        assert_eq!(breakdown[&Topic::Synonyms].correct_answers, 3);
        assert_eq!(breakdown[&Topic::Grammar].total_questions, 0);
    }

    #[test]
    fn pass_rule_uses_threshold_and_question_floor() {
        assert!(is_chapter_passed(9, 10, 20, 10, PASS_THRESHOLD));
        assert!(!is_chapter_passed(8, 10, 20, 10, PASS_THRESHOLD));
        assert!(!is_chapter_passed(5, 5, 20, 10, PASS_THRESHOLD));
        // small chapters only need what they have
        assert!(is_chapter_passed(3, 3, 3, 10, PASS_THRESHOLD));
        assert!(!is_chapter_passed(0, 0, 0, 10, PASS_THRESHOLD));
    }

    #[test]
    fn short_runs_only_need_the_configured_length() {
        assert!(is_chapter_passed(5, 5, 20, 5, PASS_THRESHOLD));
        assert!(!is_chapter_passed(4, 5, 20, 5, PASS_THRESHOLD));
        assert!(!is_chapter_passed(4, 4, 20, 5, PASS_THRESHOLD));
        assert!(is_chapter_passed(1, 1, 20, 1, PASS_THRESHOLD));
        // a larger run length never raises the floor past ten
        assert!(is_chapter_passed(10, 10, 50, 25, PASS_THRESHOLD));
    }

    #[test]
    fn levels_and_ranks() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(499), 1);
        assert_eq!(level_for_xp(500), 2);
        assert_eq!(rank_title(1), "Curious Apprentice");
        assert_eq!(rank_title(12), "Grand Lexicon Sage");
    }

    #[test]
    fn streak_resets_on_wrong_answer() {
        let mut p = Progress::new();
        p.begin_run(Topic::Grammar, Difficulty::Easy);
        assert_eq!(p.record_answer(Topic::Grammar, Difficulty::Easy, true), XP_CORRECT_ANSWER);
        p.record_answer(Topic::Grammar, Difficulty::Easy, true);
        assert_eq!(p.quest_streak, 2);
        assert_eq!(p.record_answer(Topic::Grammar, Difficulty::Easy, false), 0);
        assert_eq!(p.quest_streak, 0);
        assert_eq!(p.best_streak, 2);
        assert_eq!(p.total_xp, 2 * XP_CORRECT_ANSWER);
    }

    #[test]
    fn passing_every_chapter_masters_the_realm_once() {
        let bank = bank_with(&[(Topic::Articles, Difficulty::Easy, 2), (Topic::Articles, Difficulty::Hard, 2)]);
        let mut p = Progress::new();

        p.begin_run(Topic::Articles, Difficulty::Easy);
        p.record_answer(Topic::Articles, Difficulty::Easy, true);
        p.record_answer(Topic::Articles, Difficulty::Easy, true);
        let first = p.finish_run(Topic::Articles, Difficulty::Easy, &bank, 10, PASS_THRESHOLD);
        assert!(first.passed);
        assert!(!first.realm_mastered);
        assert_eq!(first.xp_earned, 2 * XP_CORRECT_ANSWER + XP_CHAPTER_PASS);

        p.begin_run(Topic::Articles, Difficulty::Hard);
        p.record_answer(Topic::Articles, Difficulty::Hard, true);
        p.record_answer(Topic::Articles, Difficulty::Hard, true);
        let second = p.finish_run(Topic::Articles, Difficulty::Hard, &bank, 10, PASS_THRESHOLD);
        assert!(second.realm_mastered);
        assert_eq!(
            second.xp_earned,
            2 * XP_CORRECT_ANSWER + XP_CHAPTER_PASS + XP_REALM_MASTERY
        );
        assert!(p.is_realm_mastered(Topic::Articles));

        // replaying a passed chapter earns no second bonus
        p.begin_run(Topic::Articles, Difficulty::Hard);
        p.record_answer(Topic::Articles, Difficulty::Hard, true);
        p.record_answer(Topic::Articles, Difficulty::Hard, true);
        let replay = p.finish_run(Topic::Articles, Difficulty::Hard, &bank, 10, PASS_THRESHOLD);
        assert!(replay.passed);
        assert!(!replay.realm_mastered);
        assert_eq!(replay.xp_earned, 2 * XP_CORRECT_ANSWER);
        assert_eq!(p.chapter(Topic::Articles, Difficulty::Hard).attempts, 2);
    }

    #[test]
    fn failed_run_keeps_earlier_pass() {
        let bank = bank_with(&[(Topic::Grammar, Difficulty::Easy, 2)]);
        let mut p = Progress::new();
        p.begin_run(Topic::Grammar, Difficulty::Easy);
        p.record_answer(Topic::Grammar, Difficulty::Easy, true);
        p.record_answer(Topic::Grammar, Difficulty::Easy, true);
        p.finish_run(Topic::Grammar, Difficulty::Easy, &bank, 10, PASS_THRESHOLD);

        p.begin_run(Topic::Grammar, Difficulty::Easy);
        p.record_answer(Topic::Grammar, Difficulty::Easy, false);
        p.record_answer(Topic::Grammar, Difficulty::Easy, false);
        let outcome = p.finish_run(Topic::Grammar, Difficulty::Easy, &bank, 10, PASS_THRESHOLD);
        assert!(!outcome.passed);
        assert!(p.chapter(Topic::Grammar, Difficulty::Easy).passed);
    }
}
