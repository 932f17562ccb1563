//! Multiple-choice questions, the in-memory question bank and quiz shuffling

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::realm::{Difficulty, Topic};

/// Answer letters as written in the question bank.
pub const CHOICE_LETTERS: [char; 4] = ['A', 'B', 'C', 'D'];

/// Multiple-choice question with exactly four options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub topic: Topic,
    pub prompt: String,
    pub options: [String; 4],
    pub correct_index: usize,
    pub difficulty: Difficulty,
}

impl Question {
    pub fn new(
        topic: Topic,
        prompt: impl Into<String>,
        options: [String; 4],
        correct_index: usize,
        difficulty: Difficulty,
    ) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::Validation("question prompt is empty".to_string()));
        }
        if correct_index >= options.len() {
            return Err(Error::Validation(format!(
                "correct answer index {correct_index} out of range"
            )));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(Error::Validation(format!("question '{prompt}' has an empty option")));
        }
        Ok(Self {
            topic,
            prompt,
            options,
            correct_index,
            difficulty,
        })
    }

    pub fn correct_letter(&self) -> char {
        CHOICE_LETTERS[self.correct_index]
    }

    pub fn correct_answer(&self) -> &str {
        &self.options[self.correct_index]
    }
}

/// Map an answer letter (`A`..`D`, any case) to an option index.
pub fn letter_to_index(letter: &str) -> Option<usize> {
    let mut chars = letter.trim().chars();
    let c = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() {
        return None;
    }
    CHOICE_LETTERS.iter().position(|&l| l == c)
}

/// Check a submitted option index. Anything out of range is simply wrong.
pub fn check_answer(question: &Question, index: usize) -> bool {
    index < question.options.len() && index == question.correct_index
}

/// Uniform in-place permutation (Fisher-Yates / Knuth shuffle).
///
/// Walks from the last element down to the second, swapping each with an
/// element drawn uniformly from the not-yet-fixed prefix, so every one of
/// the `n!` orderings is equally likely.
pub fn fisher_yates_shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    let n = items.len();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// All questions, loaded wholesale at startup and never modified.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn all(&self) -> &[Question] {
        &self.questions
    }

    pub fn by_topic(&self, topic: Topic) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(move |q| q.topic == topic)
    }

    pub fn chapter(&self, topic: Topic, difficulty: Difficulty) -> impl Iterator<Item = &Question> {
        self.questions
            .iter()
            .filter(move |q| q.topic == topic && q.difficulty == difficulty)
    }

    pub fn chapter_size(&self, topic: Topic, difficulty: Difficulty) -> usize {
        self.chapter(topic, difficulty).count()
    }

    /// Chapters of a realm that have at least one question.
    pub fn available_chapters(&self, topic: Topic) -> Vec<Difficulty> {
        Difficulty::ALL
            .into_iter()
            .filter(|&d| self.chapter_size(topic, d) > 0)
            .collect()
    }

    /// Question count per topic, in topic order.
    pub fn topic_counts(&self) -> BTreeMap<Topic, usize> {
        let mut counts: BTreeMap<Topic, usize> = Topic::ALL.iter().map(|&t| (t, 0)).collect();
        for q in &self.questions {
            *counts.entry(q.topic).or_default() += 1;
        }
        counts
    }

    /// Shuffled question set for one chapter run, at most `max` long.
    pub fn chapter_questions<R: Rng + ?Sized>(
        &self,
        topic: Topic,
        difficulty: Difficulty,
        max: usize,
        rng: &mut R,
    ) -> Vec<Question> {
        let mut selected: Vec<Question> = self.chapter(topic, difficulty).cloned().collect();
        fisher_yates_shuffle(&mut selected, rng);
        selected.truncate(max);
        selected
    }
}
