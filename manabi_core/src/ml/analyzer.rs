//! The dashboard's analytics pipeline and the student report built from it.

use std::path::Path;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ml::artifact::ModelKind;
use crate::ml::features::LearnerFeatures;
use crate::ml::predict::{
    Trajectory, TrajectoryClassifier, TrajectoryPrediction, WeaknessClassifier, WeaknessPrediction,
};
use crate::ml::training::{train, TrainOptions};
use crate::progress::is_chapter_passed;
use crate::questions::QuestionBank;
use crate::realm::Topic;
use crate::scores::ScoreRecord;

/// Weakness probability above which a topic needs attention.
pub const ATTENTION_THRESHOLD: f64 = 0.3;
/// Confidence above which the primary weakness gets a high-priority action.
pub const HIGH_CONFIDENCE: f64 = 0.7;

/// Output of one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub features: Option<LearnerFeatures>,
    pub weakness: WeaknessPrediction,
    pub trajectory: TrajectoryPrediction,
}

/// Holds the (optional) classifiers. Predictions are pure functions of the
/// records passed in.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    weakness: Option<WeaknessClassifier>,
    trajectory: Option<TrajectoryClassifier>,
}

impl Analyzer {
    pub fn new(weakness: Option<WeaknessClassifier>, trajectory: Option<TrajectoryClassifier>) -> Self {
        Self { weakness, trajectory }
    }

    /// Analyzer without models; every prediction is neutral.
    pub fn untrained() -> Self {
        Self::default()
    }

    /// Load whatever models exist in `models_dir`. Missing or broken
    /// artifacts are logged and left out.
    pub fn load(models_dir: &Path) -> Self {
        let weakness = WeaknessClassifier::load(models_dir)
            .map_err(|e| warn!(error = %e, "weakness detector unavailable"))
            .ok();
        let trajectory = TrajectoryClassifier::load(models_dir)
            .map_err(|e| warn!(error = %e, "progress predictor unavailable"))
            .ok();
        if weakness.is_some() && trajectory.is_some() {
            info!(dir = %models_dir.display(), "models loaded");
        }
        Self::new(weakness, trajectory)
    }

    /// Load models, training and saving any that are missing when
    /// `auto_train` is set.
    pub fn load_or_train(models_dir: &Path, auto_train: bool) -> Result<Self> {
        if auto_train {
            for kind in ModelKind::ALL {
                if !kind.path_in(models_dir).exists() {
                    info!(model = kind.display_name(), "no saved model, training one");
                    train(kind, &TrainOptions::default())?.save(models_dir)?;
                }
            }
        }
        Ok(Self::load(models_dir))
    }

    pub fn has_weakness_model(&self) -> bool {
        self.weakness.is_some()
    }

    pub fn has_trajectory_model(&self) -> bool {
        self.trajectory.is_some()
    }

    /// Test accuracy recorded in the loaded weakness artifact.
    pub fn weakness_accuracy(&self) -> Option<f64> {
        self.weakness.as_ref().map(|m| m.artifact().test_accuracy)
    }

    pub fn trajectory_accuracy(&self) -> Option<f64> {
        self.trajectory.as_ref().map(|m| m.artifact().test_accuracy)
    }

    pub fn analyze(&self, records: &[ScoreRecord]) -> Analysis {
        let Some(features) = LearnerFeatures::from_records(records) else {
            return Analysis {
                features: None,
                weakness: WeaknessPrediction::neutral(),
                trajectory: TrajectoryPrediction::neutral(),
            };
        };

        let weakness = match &self.weakness {
            Some(model) => model.predict(&features.weakness_vector()).unwrap_or_else(|e| {
                warn!(error = %e, "weakness prediction failed, using neutral output");
                WeaknessPrediction::neutral()
            }),
            None => WeaknessPrediction::neutral(),
        };
        let trajectory = match &self.trajectory {
            Some(model) => model.predict(&features.trajectory_vector()).unwrap_or_else(|e| {
                warn!(error = %e, "trajectory prediction failed, using neutral output");
                TrajectoryPrediction::neutral()
            }),
            None => TrajectoryPrediction::neutral(),
        };
        debug!(
            weakness = %weakness.topic,
            trajectory = %trajectory.label,
            "learner analysed"
        );

        Analysis {
            features: Some(features),
            weakness,
            trajectory,
        }
    }

    /// Full report for one learner.
    pub fn report(
        &self,
        learner: &str,
        records: &[ScoreRecord],
        bank: &QuestionBank,
        chapter_size: usize,
        pass_threshold: f64,
    ) -> StudentReport {
        let analysis = self.analyze(records);
        let mastered = realms_mastered(records, bank, chapter_size, pass_threshold);
        StudentReport::build(learner, &analysis, mastered)
    }
}

/// Realms whose every available chapter has a passing run on record.
pub fn realms_mastered(
    records: &[ScoreRecord],
    bank: &QuestionBank,
    chapter_size: usize,
    pass_threshold: f64,
) -> usize {
    Topic::ALL
        .iter()
        .filter(|&&topic| {
            let chapters = bank.available_chapters(topic);
            !chapters.is_empty()
                && chapters.iter().all(|&difficulty| {
                    let available = bank.chapter_size(topic, difficulty);
                    records.iter().any(|r| {
                        r.topic == topic
                            && r.difficulty == difficulty
                            && is_chapter_passed(
                                r.correct_answers,
                                r.total_questions,
                                available,
                                chapter_size,
                                pass_threshold,
                            )
                    })
                })
        })
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub action: String,
    pub reason: String,
    pub timeline: String,
}

impl Recommendation {
    fn new(priority: Priority, action: String, reason: String, timeline: &str) -> Self {
        Self {
            priority,
            action,
            reason,
            timeline: timeline.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_chapters: usize,
    /// Percent.
    pub overall_accuracy: f64,
    pub realms_mastered: usize,
    /// Percent.
    pub consistency_score: f64,
    pub total_questions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicWeakness {
    pub topic: Topic,
    pub weakness_probability: f64,
    pub current_score: f64,
    pub needs_attention: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelAnalysis {
    pub primary_weakness: Topic,
    pub confidence: f64,
    pub weakness_breakdown: Vec<TopicWeakness>,
    pub learning_trajectory: Trajectory,
    pub improvement_probability: f64,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentReport {
    pub student_name: String,
    pub report_date: String,
    pub summary: ReportSummary,
    pub analysis: ModelAnalysis,
    pub recommendations: Vec<Recommendation>,
    pub insights: Vec<String>,
}

fn title_case(topic: Topic) -> String {
    let name = topic.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl StudentReport {
    pub fn build(learner: &str, analysis: &Analysis, realms_mastered: usize) -> Self {
        let features = analysis.features.as_ref();
        let weakness = &analysis.weakness;
        let trajectory = &analysis.trajectory;

        let summary = ReportSummary {
            total_chapters: features.map_or(0, |f| f.chapters_completed),
            overall_accuracy: features.map_or(0.0, |f| f.overall_accuracy * 100.0),
            realms_mastered,
            consistency_score: features.map_or(100.0, |f| f.consistency() * 100.0),
            total_questions: features.map_or(0, |f| f.total_questions),
        };

        let weakness_breakdown = Topic::ALL
            .iter()
            .map(|&topic| {
                let probability = weakness.probability(topic);
                TopicWeakness {
                    topic,
                    weakness_probability: probability,
                    current_score: features.map_or(0.0, |f| f.topic_score(topic)),
                    needs_attention: probability > ATTENTION_THRESHOLD,
                }
            })
            .collect();

        Self {
            student_name: learner.to_string(),
            report_date: Local::now().format("%Y-%m-%d %H:%M").to_string(),
            summary,
            analysis: ModelAnalysis {
                primary_weakness: weakness.topic,
                confidence: weakness.confidence,
                weakness_breakdown,
                learning_trajectory: trajectory.label,
                improvement_probability: trajectory.improvement_probability(),
                is_default: weakness.is_default || trajectory.is_default,
            },
            recommendations: recommendations(analysis),
            insights: insights(analysis),
        }
    }
}

fn recommendations(analysis: &Analysis) -> Vec<Recommendation> {
    let weakness = &analysis.weakness;
    let trajectory = &analysis.trajectory;
    let mut out = Vec::new();

    if analysis.features.is_none() {
        out.push(Recommendation::new(
            Priority::Low,
            "Complete your first chapter in any realm".to_string(),
            "No adventures recorded yet".to_string(),
            "Today",
        ));
        return out;
    }

    if weakness.confidence > HIGH_CONFIDENCE {
        out.push(Recommendation::new(
            Priority::High,
            format!("Focus intensively on {}", title_case(weakness.topic)),
            format!(
                "The model is {:.1}% confident this is your weakest area",
                weakness.confidence * 100.0
            ),
            "1-2 weeks",
        ));
    }

    for (topic, probability) in weakness.ranked().into_iter().skip(1).take(2) {
        if probability > ATTENTION_THRESHOLD {
            out.push(Recommendation::new(
                Priority::Medium,
                format!("Practice {} regularly", title_case(topic)),
                format!("{:.1}% probability of needing attention", probability * 100.0),
                "2-3 weeks",
            ));
        }
    }

    if !trajectory.is_default {
        match trajectory.label {
            Trajectory::Improve => out.push(Recommendation::new(
                Priority::Low,
                "Continue your current study pattern".to_string(),
                format!(
                    "{:.1}% probability of continued improvement",
                    trajectory.improvement_probability() * 100.0
                ),
                "Ongoing",
            )),
            Trajectory::Decline => out.push(Recommendation::new(
                Priority::High,
                "Increase study frequency and review fundamentals".to_string(),
                "The model predicts a risk of declining performance".to_string(),
                "Immediate",
            )),
            Trajectory::Stable => {}
        }
    }

    out.sort_by_key(|r| r.priority);
    out
}

fn insights(analysis: &Analysis) -> Vec<String> {
    let Some(features) = analysis.features.as_ref() else {
        return vec!["🌱 Your adventure journal is still empty".to_string()];
    };
    let mut out = Vec::new();

    let chapters = features.chapters_completed;
    out.push(if chapters >= 10 {
        format!("🎯 Extensive learner with {chapters} chapters completed")
    } else if chapters >= 5 {
        format!("📚 Dedicated learner with {chapters} chapters completed")
    } else {
        format!("🌱 Beginning learner with {chapters} chapters completed")
    });

    let consistency = features.consistency();
    out.push(
        if consistency > 0.9 {
            "⭐ Highly consistent performance across topics"
        } else if consistency > 0.7 {
            "👍 Good consistency with some variation"
        } else {
            "📊 Variable performance, focus on consistency"
        }
        .to_string(),
    );

    let attempted: Vec<Topic> = Topic::ALL
        .into_iter()
        .filter(|&t| features.chapters.iter().any(|c| c.topic == t))
        .collect();
    let strong: Vec<&str> = attempted
        .iter()
        .filter(|&&t| features.topic_score(t) > 0.85)
        .map(|t| t.as_str())
        .collect();
    let weak: Vec<&str> = attempted
        .iter()
        .filter(|&&t| features.topic_score(t) < 0.7)
        .map(|t| t.as_str())
        .collect();
    if !strong.is_empty() {
        out.push(format!("💪 Strong in: {}", strong.join(", ")));
    }
    if !weak.is_empty() {
        out.push(format!("🎯 Needs work: {}", weak.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::forest::{ForestParams, RandomForest};
    use crate::ml::artifact::ModelArtifact;
    use crate::progress::PASS_THRESHOLD;
    use crate::questions::Question;
    use crate::realm::Difficulty;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    fn record(topic: Topic, difficulty: Difficulty, correct: u32, total: u32) -> ScoreRecord {
        ScoreRecord::new("Alex", topic, difficulty, correct, total, 120).with_timestamp(
            NaiveDateTime::parse_from_str("2024-05-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        )
    }

    fn small_options() -> TrainOptions {
        TrainOptions {
            samples: Some(400),
            trees: Some(10),
            seed: None,
        }
    }

    fn trained() -> Analyzer {
        Analyzer::new(
            Some(WeaknessClassifier::new(train(ModelKind::Weakness, &small_options()).unwrap()).unwrap()),
            Some(TrajectoryClassifier::new(train(ModelKind::Trajectory, &small_options()).unwrap()).unwrap()),
        )
    }

    #[test]
    fn zero_attempts_are_neutral() {
        let analysis = trained().analyze(&[]);
        assert!(analysis.features.is_none());
        assert_eq!(analysis.weakness, WeaknessPrediction::neutral());
        assert_eq!(analysis.trajectory, TrajectoryPrediction::neutral());

        let report = StudentReport::build("Alex", &analysis, 0);
        assert_eq!(report.summary.total_chapters, 0);
        assert!(report.analysis.is_default);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn missing_models_are_neutral() {
        let analysis = Analyzer::untrained().analyze(&[record(Topic::Grammar, Difficulty::Easy, 3, 10)]);
        assert!(analysis.features.is_some());
        assert!(analysis.weakness.is_default);
        assert!(analysis.trajectory.is_default);
    }

    #[test]
    fn model_output_is_used_when_available() {
        let records = vec![
            record(Topic::Grammar, Difficulty::Easy, 9, 10),
            record(Topic::Synonyms, Difficulty::Easy, 2, 10),
        ];
        let analysis = trained().analyze(&records);
        assert!(!analysis.weakness.is_default);
        assert!(!analysis.trajectory.is_default);
        let sum: f64 = analysis.weakness.probabilities.iter().map(|p| p.1).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_features_fall_back_to_neutral() {
        // a forest that expects 3 features cannot score an 11-value row
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64; 3]).collect();
        let y: Vec<usize> = (0..20).map(|i| i % 5).collect();
        let params = ForestParams {
            n_trees: 2,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, 5, &params).unwrap();
        let artifact = ModelArtifact::new(ModelKind::Weakness, forest, 1.0, 1.0, 20);
        assert!(WeaknessClassifier::new(artifact.clone()).is_err());

        let analyzer = Analyzer::new(Some(WeaknessClassifier::unchecked(artifact)), None);
        let analysis = analyzer.analyze(&[record(Topic::Articles, Difficulty::Hard, 5, 10)]);
        assert!(analysis.features.is_some());
        assert_eq!(analysis.weakness, WeaknessPrediction::neutral());
    }

    #[test]
    fn empty_models_dir_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let analyzer = Analyzer::load(dir.path());
        assert!(!analyzer.has_weakness_model());
        assert!(!analyzer.has_trajectory_model());
        assert_eq!(analyzer.weakness_accuracy(), None);
    }

    #[test]
    fn broken_forest_on_disk_falls_back_to_neutral() {
        let dir = TempDir::new().unwrap();
        let artifact = train(ModelKind::Weakness, &small_options()).unwrap();
        let mut json = serde_json::to_value(&artifact).unwrap();
        json["forest"]["trees"][0]["nodes"][0]["left"] = 0.into();
        std::fs::write(
            ModelKind::Weakness.path_in(dir.path()),
            serde_json::to_string(&json).unwrap(),
        )
        .unwrap();

        let analyzer = Analyzer::load(dir.path());
        assert!(!analyzer.has_weakness_model());
        let analysis = analyzer.analyze(&[record(Topic::Articles, Difficulty::Hard, 5, 10)]);
        assert_eq!(analysis.weakness, WeaknessPrediction::neutral());
    }

    #[test]
    fn load_or_train_without_auto_train_stays_empty() {
        let dir = TempDir::new().unwrap();
        let analyzer = Analyzer::load_or_train(dir.path(), false).unwrap();
        assert!(!analyzer.has_weakness_model());
        assert!(!analyzer.has_trajectory_model());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn saved_models_are_picked_up() {
        let dir = TempDir::new().unwrap();
        for kind in ModelKind::ALL {
            train(kind, &small_options()).unwrap().save(dir.path()).unwrap();
        }
        let analyzer = Analyzer::load(dir.path());
        assert!(analyzer.has_weakness_model());
        assert!(analyzer.has_trajectory_model());
        for accuracy in [analyzer.weakness_accuracy(), analyzer.trajectory_accuracy()] {
            let accuracy = accuracy.unwrap();
            assert!((0.0..=1.0).contains(&accuracy));
        }
    }

    #[test]
    fn recommendations_follow_confidence_and_trajectory() {
        let mut weakness = WeaknessPrediction::neutral();
        weakness.is_default = false;
        weakness.topic = Topic::Articles;
        weakness.confidence = 0.75;
        weakness.probabilities = [
            (Topic::Grammar, 0.05),
            (Topic::Articles, 0.75),
            (Topic::Synonyms, 0.05),
            (Topic::Antonyms, 0.1),
            (Topic::Sentences, 0.05),
        ];
        let mut trajectory = TrajectoryPrediction::neutral();
        trajectory.is_default = false;
        trajectory.label = Trajectory::Decline;
        let analysis = Analysis {
            features: LearnerFeatures::from_records(&[record(Topic::Articles, Difficulty::Easy, 4, 10)]),
            weakness,
            trajectory,
        };
        let recs = recommendations(&analysis);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.priority == Priority::High));
        assert!(recs[0].action.contains("Articles"));
    }

    #[test]
    fn secondary_weaknesses_need_attention_to_be_listed() {
        let mut weakness = WeaknessPrediction::neutral();
        weakness.is_default = false;
        weakness.topic = Topic::Grammar;
        weakness.confidence = 0.4;
        weakness.probabilities = [
            (Topic::Grammar, 0.4),
            (Topic::Articles, 0.35),
            (Topic::Synonyms, 0.1),
            (Topic::Antonyms, 0.1),
            (Topic::Sentences, 0.05),
        ];
        let analysis = Analysis {
            features: LearnerFeatures::from_records(&[record(Topic::Grammar, Difficulty::Easy, 4, 10)]),
            weakness,
            trajectory: TrajectoryPrediction::neutral(),
        };
        let recs = recommendations(&analysis);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].priority, Priority::Medium);
        assert!(recs[0].action.contains("Articles"));
    }

    #[test]
    fn insights_name_strong_and_weak_topics() {
        let records = vec![
            record(Topic::Grammar, Difficulty::Easy, 10, 10),
            record(Topic::Antonyms, Difficulty::Easy, 3, 10),
        ];
        let analysis = Analyzer::untrained().analyze(&records);
        let insights = insights(&analysis);
        assert!(insights[0].contains("Beginning learner with 2 chapters"));
        assert!(insights.iter().any(|i| i == "💪 Strong in: grammar"));
        assert!(insights.iter().any(|i| i == "🎯 Needs work: antonyms"));
    }

    #[test]
    fn mastery_counts_realms_with_every_chapter_passed() {
        let q = |topic, difficulty, n: usize| {
            Question::new(
                topic,
                format!("Q{n}"),
                ["a".into(), "b".into(), "c".into(), "d".into()],
                0,
                difficulty,
            )
            .unwrap()
        };
        let bank = QuestionBank::new(vec![
            q(Topic::Grammar, Difficulty::Easy, 1),
            q(Topic::Grammar, Difficulty::Hard, 2),
            q(Topic::Articles, Difficulty::Easy, 3),
        ]);
        let records = vec![
            record(Topic::Grammar, Difficulty::Easy, 1, 1),
            record(Topic::Articles, Difficulty::Easy, 1, 1),
        ];
        assert_eq!(realms_mastered(&records, &bank, 10, PASS_THRESHOLD), 1);

        let mut more = records.clone();
        more.push(record(Topic::Grammar, Difficulty::Hard, 1, 1));
        assert_eq!(realms_mastered(&more, &bank, 10, PASS_THRESHOLD), 2);
    }

    #[test]
    fn mastery_honours_short_chapter_runs() {
        let bank = QuestionBank::new(
            (0..12)
                .map(|n| {
                    Question::new(
                        Topic::Synonyms,
                        format!("Q{n}"),
                        ["a".into(), "b".into(), "c".into(), "d".into()],
                        0,
                        Difficulty::Easy,
                    )
                    .unwrap()
                })
                .collect(),
        );
        let records = vec![record(Topic::Synonyms, Difficulty::Easy, 5, 5)];
        assert_eq!(realms_mastered(&records, &bank, 10, PASS_THRESHOLD), 0);
        assert_eq!(realms_mastered(&records, &bank, 5, PASS_THRESHOLD), 1);
    }
}
