//! Offline training on synthetic learner populations.
//!
//! Both generators are seeded, so a given seed, sample count and forest size
//! always yield the same artifact (apart from its timestamp).

use std::collections::BTreeMap;
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::ml::artifact::{CrossValidation, ModelArtifact, ModelKind};
use crate::ml::forest::{ForestParams, RandomForest};
use crate::questions::fisher_yates_shuffle;

pub const WEAKNESS_SEED: u64 = 42;
pub const TRAJECTORY_SEED: u64 = 123;
pub const EVALUATION_SEED: u64 = 2024;
pub const WEAKNESS_SAMPLES: usize = 5000;
pub const TRAJECTORY_SAMPLES: usize = 3000;
pub const EVALUATION_SAMPLES: usize = 200;
pub const TEST_FRACTION: f64 = 0.2;
pub const CV_FOLDS: usize = 5;

/// Feature rows with their class labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn push(&mut self, row: Vec<f64>, label: usize) {
        self.features.push(row);
        self.labels.push(label);
    }

    fn subset(&self, indices: &[usize]) -> Dataset {
        let mut out = Dataset::default();
        for &i in indices {
            out.push(self.features[i].clone(), self.labels[i]);
        }
        out
    }
}

/// Overrides for the default training setup.
#[derive(Debug, Clone, Default)]
pub struct TrainOptions {
    pub samples: Option<usize>,
    pub trees: Option<usize>,
    pub seed: Option<u64>,
}

/// Standard normal sample via Box-Muller.
fn sample_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::EPSILON);
    let u2: f64 = rng.gen();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Synthetic learners: beginner / intermediate / advanced skill bands with
/// correlated grammar-family and vocabulary-family scores. The label is the
/// topic with the lowest score.
pub fn weakness_dataset(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Dataset::default();

    for _ in 0..n {
        let band: f64 = rng.gen();
        let base_skill = if band < 0.4 {
            rng.gen_range(0.3..0.6)
        } else if band < 0.8 {
            rng.gen_range(0.5..0.8)
        } else {
            rng.gen_range(0.7..0.95)
        };

        let grammar = base_skill + sample_normal(&mut rng, 0.0, 0.1);
        let sentences = grammar + sample_normal(&mut rng, 0.0, 0.05);
        let articles = grammar + sample_normal(&mut rng, 0.0, 0.08);
        let vocab = base_skill + sample_normal(&mut rng, 0.0, 0.15);
        let synonyms = vocab + sample_normal(&mut rng, 0.0, 0.06);
        let antonyms = vocab + sample_normal(&mut rng, 0.0, 0.06);

        // topic order: grammar, articles, synonyms, antonyms, sentences
        let scores = [grammar, articles, synonyms, antonyms, sentences].map(|s| s.clamp(0.1, 0.98));
        let weakest = scores
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |min, (i, &s)| if s < min.1 { (i, s) } else { min })
            .0;

        let chapters_completed = rng.gen_range(1..15) as f64;
        let avg_time_per_question = rng.gen_range(5.0..25.0);
        let session_frequency = rng.gen_range(1.0..7.0);
        let mean = scores.iter().sum::<f64>() / 5.0;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / 5.0;
        let total_questions = chapters_completed * rng.gen_range(4..8) as f64;

        let mut row = scores.to_vec();
        row.extend([
            avg_time_per_question,
            chapters_completed,
            session_frequency,
            variance,
            mean,
            total_questions,
        ]);
        data.push(row, weakest);
    }
    data
}

/// Synthetic sessions: hidden motivation and consistency drive the
/// next-session improvement, which is bucketed into decline / stable /
/// improve.
pub fn trajectory_dataset(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut data = Dataset::default();

    for _ in 0..n {
        let motivation = rng.gen_range(0.3..1.0);
        let consistency = rng.gen_range(0.4..1.0);
        let current_score = rng.gen_range(0.1..0.95);
        let chapters = rng.gen_range(5..15) as f64;
        let elapsed = rng.gen_range(60.0..600.0);
        let attempts = rng.gen_range(0..10) as f64;

        let improvement = (motivation * consistency * 0.1
            + (1.0 - current_score) * 0.3
            + sample_normal(&mut rng, 0.0, 0.05))
        .clamp(-0.2, 0.4);
        let label = if improvement < -0.02 {
            0
        } else if improvement < 0.05 {
            1
        } else {
            2
        };
        data.push(vec![current_score, chapters, elapsed, attempts], label);
    }
    data
}

pub fn dataset(kind: ModelKind, n: usize, seed: u64) -> Dataset {
    match kind {
        ModelKind::Weakness => weakness_dataset(n, seed),
        ModelKind::Trajectory => trajectory_dataset(n, seed),
    }
}

/// Split keeping each label's share equal in both halves.
pub fn stratified_split(data: &Dataset, test_fraction: f64, seed: u64) -> (Dataset, Dataset) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut by_label: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in data.labels.iter().enumerate() {
        by_label.entry(label).or_default().push(i);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for indices in by_label.values_mut() {
        fisher_yates_shuffle(indices, &mut rng);
        let n_test = (indices.len() as f64 * test_fraction).round() as usize;
        let n_test = n_test.min(indices.len().saturating_sub(1));
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }
    fisher_yates_shuffle(&mut train, &mut rng);
    fisher_yates_shuffle(&mut test, &mut rng);
    (data.subset(&train), data.subset(&test))
}

/// Stratified k-fold partition: each label's shuffled indices are dealt
/// round-robin across the folds.
pub fn stratified_folds(labels: &[usize], k: usize, seed: u64) -> Vec<Vec<usize>> {
    let k = k.max(1);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut by_label: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_label.entry(label).or_default().push(i);
    }

    let mut folds = vec![Vec::new(); k];
    let mut next = 0;
    for indices in by_label.values_mut() {
        fisher_yates_shuffle(indices, &mut rng);
        for &i in indices.iter() {
            folds[next % k].push(i);
            next += 1;
        }
    }
    folds
}

/// Accuracy of `k` forests, each scored on the fold it did not see.
/// `None` when there are fewer rows than folds.
pub fn cross_validate(
    data: &Dataset,
    n_classes: usize,
    params: &ForestParams,
    k: usize,
    seed: u64,
) -> Result<Option<CrossValidation>> {
    if k < 2 || data.len() < k {
        return Ok(None);
    }
    let folds = stratified_folds(&data.labels, k, seed);
    let mut scores = Vec::with_capacity(k);
    for (f, held_out) in folds.iter().enumerate() {
        let rest: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|&(g, _)| g != f)
            .flat_map(|(_, fold)| fold.iter().copied())
            .collect();
        let (fit_on, score_on) = (data.subset(&rest), data.subset(held_out));
        let forest = RandomForest::fit(&fit_on.features, &fit_on.labels, n_classes, params)?;
        scores.push(forest.accuracy(&score_on.features, &score_on.labels)?);
    }
    let mean = scores.iter().sum::<f64>() / k as f64;
    let std = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / k as f64).sqrt();
    Ok(Some(CrossValidation { folds: k, mean, std }))
}

/// Forest setup per classifier.
pub fn default_params(kind: ModelKind) -> ForestParams {
    match kind {
        ModelKind::Weakness => ForestParams {
            n_trees: 200,
            max_depth: Some(15),
            min_samples_split: 5,
            min_samples_leaf: 2,
            balanced: true,
            seed: 42,
        },
        ModelKind::Trajectory => ForestParams {
            n_trees: 100,
            ..ForestParams::default()
        },
    }
}

fn default_samples(kind: ModelKind) -> usize {
    match kind {
        ModelKind::Weakness => WEAKNESS_SAMPLES,
        ModelKind::Trajectory => TRAJECTORY_SAMPLES,
    }
}

fn default_seed(kind: ModelKind) -> u64 {
    match kind {
        ModelKind::Weakness => WEAKNESS_SEED,
        ModelKind::Trajectory => TRAJECTORY_SEED,
    }
}

/// Generate data, train the forest and package it as an artifact.
pub fn train(kind: ModelKind, options: &TrainOptions) -> Result<ModelArtifact> {
    let samples = options.samples.unwrap_or_else(|| default_samples(kind));
    let seed = options.seed.unwrap_or_else(|| default_seed(kind));
    let mut params = default_params(kind);
    if let Some(trees) = options.trees {
        params.n_trees = trees;
    }

    let data = dataset(kind, samples, seed);
    let (train_set, test_set) = stratified_split(&data, TEST_FRACTION, seed);
    info!(
        model = kind.display_name(),
        train = train_set.len(),
        test = test_set.len(),
        trees = params.n_trees,
        "training"
    );

    let n_classes = kind.labels().len();
    let forest = RandomForest::fit(&train_set.features, &train_set.labels, n_classes, &params)?;
    let training_accuracy = forest.accuracy(&train_set.features, &train_set.labels)?;
    let test_accuracy = if test_set.is_empty() {
        training_accuracy
    } else {
        forest.accuracy(&test_set.features, &test_set.labels)?
    };
    let cross_validation = cross_validate(&train_set, n_classes, &params, CV_FOLDS, seed)?;
    info!(
        model = kind.display_name(),
        training_accuracy,
        test_accuracy,
        cv_mean = cross_validation.map(|cv| cv.mean),
        "training finished"
    );

    let mut artifact = ModelArtifact::new(kind, forest, training_accuracy, test_accuracy, data.len());
    artifact.cross_validation = cross_validation;
    Ok(artifact)
}

/// Quality band of an evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    VeryGood,
    Good,
    NeedsWork,
}

impl EvaluationStatus {
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy >= 0.9 {
            EvaluationStatus::VeryGood
        } else if accuracy >= 0.8 {
            EvaluationStatus::Good
        } else {
            EvaluationStatus::NeedsWork
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvaluationStatus::VeryGood => "✅ Very Good",
            EvaluationStatus::Good => "👍 Good",
            EvaluationStatus::NeedsWork => "⚠️ Needs Work",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub kind: ModelKind,
    pub samples: usize,
    pub accuracy: f64,
    pub status: EvaluationStatus,
}

/// Score an artifact on a freshly generated population.
pub fn evaluate(artifact: &ModelArtifact, samples: usize, seed: u64) -> Result<Evaluation> {
    let data = dataset(artifact.kind, samples, seed);
    let accuracy = artifact.forest.accuracy(&data.features, &data.labels)?;
    Ok(Evaluation {
        kind: artifact.kind,
        samples,
        accuracy,
        status: EvaluationStatus::from_accuracy(accuracy),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weakness_rows_are_well_formed() {
        let data = weakness_dataset(500, 1);
        assert_eq!(data.len(), 500);
        for (row, &label) in data.features.iter().zip(&data.labels) {
            assert_eq!(row.len(), 11);
            assert!(row[..5].iter().all(|s| (0.1..=0.98).contains(s)));
            let min = row[..5].iter().cloned().fold(f64::INFINITY, f64::min);
            assert_eq!(row[label], min);
            assert!(row[10] >= row[6] * 4.0 && row[10] <= row[6] * 7.0);
        }
    }

    #[test]
    fn trajectory_rows_cover_all_labels() {
        let data = trajectory_dataset(3000, 2);
        assert!(data.features.iter().all(|r| r.len() == 4));
        for label in 0..3 {
            assert!(data.labels.contains(&label), "label {label} never generated");
        }
    }

    #[test]
    fn generators_are_seeded() {
        assert_eq!(weakness_dataset(50, 9), weakness_dataset(50, 9));
        assert_ne!(weakness_dataset(50, 9), weakness_dataset(50, 10));
    }

    #[test]
    fn split_is_stratified_and_disjoint() {
        let data = trajectory_dataset(1000, 3);
        let (train, test) = stratified_split(&data, 0.2, 3);
        assert_eq!(train.len() + test.len(), data.len());
        assert!((190..=210).contains(&test.len()));
        for label in 0..3 {
            let total = data.labels.iter().filter(|&&l| l == label).count() as f64;
            if total < 50.0 {
                continue;
            }
            let in_test = test.labels.iter().filter(|&&l| l == label).count() as f64;
            assert!((in_test / total - 0.2).abs() < 0.02);
        }
    }

    #[test]
    fn trained_models_beat_chance() {
        let options = TrainOptions {
            samples: Some(800),
            trees: Some(20),
            seed: None,
        };
        let weakness = train(ModelKind::Weakness, &options).unwrap();
        assert_eq!(weakness.sample_size, 800);
        assert!(weakness.test_accuracy > 0.4, "accuracy {}", weakness.test_accuracy);

        let eval = evaluate(&weakness, 200, EVALUATION_SEED).unwrap();
        assert_eq!(eval.samples, 200);
        assert!(eval.accuracy > 0.4);

        let trajectory = train(ModelKind::Trajectory, &options).unwrap();
        assert!(trajectory.test_accuracy > 0.5, "accuracy {}", trajectory.test_accuracy);

        for artifact in [&weakness, &trajectory] {
            let cv = artifact.cross_validation.unwrap();
            assert_eq!(cv.folds, CV_FOLDS);
            assert!((0.0..=1.0).contains(&cv.mean));
            assert!(cv.std >= 0.0 && cv.std < 0.5);
        }
        assert!(weakness.cross_validation.unwrap().mean > 0.4);
    }

    #[test]
    fn folds_partition_every_row_by_label() {
        let data = trajectory_dataset(503, 4);
        let folds = stratified_folds(&data.labels, 5, 4);
        assert_eq!(folds.len(), 5);
        let mut seen: Vec<usize> = folds.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..503).collect::<Vec<_>>());
        assert!(folds.iter().all(|f| (100..=101).contains(&f.len())));
    }

    #[test]
    fn too_few_rows_skip_cross_validation() {
        let data = trajectory_dataset(3, 5);
        let params = ForestParams {
            n_trees: 2,
            ..ForestParams::default()
        };
        assert_eq!(cross_validate(&data, 3, &params, 5, 5).unwrap(), None);
    }

    #[test]
    fn status_bands() {
        assert_eq!(EvaluationStatus::from_accuracy(0.95), EvaluationStatus::VeryGood);
        assert_eq!(EvaluationStatus::from_accuracy(0.9), EvaluationStatus::VeryGood);
        assert_eq!(EvaluationStatus::from_accuracy(0.85), EvaluationStatus::Good);
        assert_eq!(EvaluationStatus::from_accuracy(0.5), EvaluationStatus::NeedsWork);
    }
}
