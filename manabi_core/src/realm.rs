//! The five adventure realms (topics), their chapters and narrative copy.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One of the five fixed English-skill categories.
///
/// The declaration order is the class order of the weakness classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Grammar,
    Articles,
    Synonyms,
    Antonyms,
    Sentences,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Grammar,
        Topic::Articles,
        Topic::Synonyms,
        Topic::Antonyms,
        Topic::Sentences,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Grammar => "grammar",
            Topic::Articles => "articles",
            Topic::Synonyms => "synonyms",
            Topic::Antonyms => "antonyms",
            Topic::Sentences => "sentences",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Topic> {
        Topic::ALL.get(index).copied()
    }

    pub fn realm(&self) -> &'static Realm {
        &REALMS[self.index()]
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grammar" => Ok(Topic::Grammar),
            "articles" => Ok(Topic::Articles),
            "synonyms" => Ok(Topic::Synonyms),
            "antonyms" => Ok(Topic::Antonyms),
            "sentences" => Ok(Topic::Sentences),
            other => Err(Error::Validation(format!("unknown topic: '{other}'"))),
        }
    }
}

/// Difficulty tier; each tier is one chapter of a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            Difficulty::Easy => "🌱",
            Difficulty::Medium => "🌿",
            Difficulty::Hard => "🌳",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(Error::Validation(format!("unknown difficulty: '{other}'"))),
        }
    }
}

/// Narrative metadata for a realm.
#[derive(Debug)]
pub struct Realm {
    pub topic: Topic,
    pub name: &'static str,
    pub emoji: &'static str,
    pub description: &'static str,
    pub welcome: &'static str,
    pub mentor: &'static str,
    /// Chapter names indexed easy, medium, hard.
    chapters: [&'static str; 3],
}

impl Realm {
    pub fn chapter_name(&self, difficulty: Difficulty) -> &'static str {
        self.chapters[difficulty as usize]
    }
}

static REALMS: [Realm; 5] = [
    Realm {
        topic: Topic::Grammar,
        name: "Grammar Grove",
        emoji: "🌳",
        description: "Ancient woods where verb sprites dance and pronoun pixies play",
        welcome: "Welcome to Grammar Grove, where the wise old Oak teaches the secrets of perfect sentences!",
        mentor: "Professor Syntax, the Grammar Guardian",
        chapters: ["The Whispering Woods", "The Enchanted Clearing", "The Sacred Grove"],
    },
    Realm {
        topic: Topic::Articles,
        name: "Article Academy",
        emoji: "📜",
        description: "Ancient library with mysterious scrolls missing crucial words",
        welcome: "Enter the hallowed halls of Article Academy, where ancient scrolls await completion!",
        mentor: "Librarian Articula, Keeper of the Scrolls",
        chapters: ["The Reading Room", "The Manuscript Hall", "The Sacred Archive"],
    },
    Realm {
        topic: Topic::Synonyms,
        name: "Synonym Sanctuary",
        emoji: "🦋",
        description: "Magical garden where creatures speak only in similar words",
        welcome: "Welcome to Synonym Sanctuary, where every word has a twin waiting to be discovered!",
        mentor: "The Wordweaver, Guardian of Meanings",
        chapters: ["The Garden Gates", "The Butterfly Meadow", "The Heart of the Sanctuary"],
    },
    Realm {
        topic: Topic::Antonyms,
        name: "Antonym Archipelago",
        emoji: "🪞",
        description: "Mirror islands where everything means the opposite",
        welcome: "Cross the waters to Antonym Archipelago, where opposites attract and mirrors reveal truth!",
        mentor: "Captain Contrary, Master of Opposites",
        chapters: ["Mirror Bay", "Reflection Ridge", "The Opposite Observatory"],
    },
    Realm {
        topic: Topic::Sentences,
        name: "Sentence Citadel",
        emoji: "🏰",
        description: "Magnificent fortress where perfect sentences unlock magical doors",
        welcome: "Behold the Sentence Citadel, where every explorer must master the art of perfect construction!",
        mentor: "The Grand Architect of Language",
        chapters: ["The Outer Courtyard", "The Great Hall", "The Throne Room"],
    },
];

/// All realms in classifier order.
pub fn realms() -> &'static [Realm] {
    &REALMS
}

/// Story line shown when a chapter begins.
pub fn chapter_intro(topic: Topic, difficulty: Difficulty, player: &str) -> String {
    let realm = topic.realm();
    let chapter = realm.chapter_name(difficulty);
    match difficulty {
        Difficulty::Easy => format!(
            "{player} stepped into {chapter}, where gentle sunbeams danced overhead. {} smiled warmly: \
             'Master these simple challenges and the spirits of {} will guide you deeper!'",
            realm.mentor, realm.name
        ),
        Difficulty::Medium => format!(
            "Deeper in {}, {player} reached {chapter}. {} nodded approvingly: \
             'You have come far, explorer. These puzzles will test what you have learned.'",
            realm.name, realm.mentor
        ),
        Difficulty::Hard => format!(
            "At last, {player} stood before {chapter}, where the deepest secrets are kept. \
             {} spoke solemnly: 'Only true mastery will unlock these mysteries, dear adventurer!'",
            realm.mentor
        ),
    }
}

/// Mentor's message after a chapter run.
pub fn encouragement<R: Rng + ?Sized>(topic: Topic, accuracy: f64, passed: bool, rng: &mut R) -> String {
    let realm = topic.realm();
    let mentor = realm.mentor;
    let lines = if passed {
        [
            format!("🌟 'Magnificent work, brave explorer!' exclaimed {mentor}. 'You've achieved {accuracy:.1}% mastery, truly worthy of the ancient halls of learning!'"),
            format!("⚡ The magical crystals of {} glow with approval! {mentor} beams proudly: 'With {accuracy:.1}% accuracy, you've proven yourself a true word-warrior!'", realm.name),
            format!("🎭 'Splendid adventure, young scholar!' {mentor} declares. 'Your {accuracy:.1}% mastery has unlocked new mysteries in our realm!'"),
            format!("🏆 The entire {} celebrates your triumph! {mentor} bows respectfully: 'Such wisdom at {accuracy:.1}%!'", realm.name),
        ]
    } else {
        [
            format!("🌱 'Fear not, dear adventurer!' {mentor} says kindly. 'With {accuracy:.1}%, you've shown great promise! Return when you feel ready to strengthen your skills!'"),
            format!("📚 {mentor} smiles warmly: 'Your {accuracy:.1}% shows excellent progress, but the ancient magic requires 89% mastery. Study the scrolls and return stronger!'"),
            format!("🔮 'The crystals whisper of your potential!' {mentor} encourages. 'You achieved {accuracy:.1}%, so close to unlocking the full mysteries!'"),
            format!("🌟 'Every great explorer faces challenges!' {mentor} says with twinkling eyes. 'Your {accuracy:.1}% proves you have the heart of a scholar.'"),
        ]
    };
    lines
        .choose(rng)
        .cloned()
        .unwrap_or_default()
}

/// The oracle's recommendation for a predicted weakness.
pub fn oracle_message(player: &str, weakness: Topic, confidence: f64) -> String {
    let realm = weakness.realm();
    format!(
        "{player}, the mystical currents reveal your greatest opportunity for growth! \
         Focus your next adventures in {} {}. The spirits whisper with {:.1}% certainty \
         that treasures of knowledge await you there, and {} is ready to guide you.",
        realm.emoji,
        realm.name,
        confidence * 100.0,
        realm.mentor
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn topic_order_matches_classifier_indices() {
        for (i, topic) in Topic::ALL.iter().enumerate() {
            assert_eq!(topic.index(), i);
            assert_eq!(Topic::from_index(i), Some(*topic));
            assert_eq!(topic.realm().topic, *topic);
        }
        assert_eq!(Topic::from_index(5), None);
    }

    #[test]
    fn topic_parse_is_case_insensitive() {
        assert_eq!(" Grammar ".parse::<Topic>().unwrap(), Topic::Grammar);
        assert_eq!("SENTENCES".parse::<Topic>().unwrap(), Topic::Sentences);
        assert!("spelling".parse::<Topic>().is_err());
    }

    #[test]
    fn difficulty_parse_rejects_typos() {
        assert_eq!("Medium".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert!("early".parse::<Difficulty>().is_err());
    }

    #[test]
    fn encouragement_mentions_accuracy() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let msg = encouragement(Topic::Articles, 91.0, true, &mut rng);
        assert!(msg.contains("91.0%"));
        let msg = encouragement(Topic::Articles, 40.0, false, &mut rng);
        assert!(msg.contains("40.0%"));
    }

    #[test]
    fn oracle_names_the_realm() {
        let msg = oracle_message("Alex", Topic::Antonyms, 0.62);
        assert!(msg.contains("Antonym Archipelago"));
        assert!(msg.contains("62.0%"));
    }
}
