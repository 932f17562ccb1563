//! Serving-side classifiers: stateless wrappers over loaded artifacts.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ml::artifact::{ModelArtifact, ModelKind};
use crate::ml::forest::argmax;
use crate::realm::Topic;

/// Predicted direction of a learner's next session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trajectory {
    Decline,
    Stable,
    Improve,
}

impl Trajectory {
    pub const ALL: [Trajectory; 3] = [Trajectory::Decline, Trajectory::Stable, Trajectory::Improve];

    pub fn as_str(&self) -> &'static str {
        match self {
            Trajectory::Decline => "decline",
            Trajectory::Stable => "stable",
            Trajectory::Improve => "improve",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Trajectory::Decline => "📉",
            Trajectory::Stable => "➡️",
            Trajectory::Improve => "📈",
        }
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeaknessPrediction {
    pub topic: Topic,
    pub probabilities: [(Topic, f64); 5],
    pub confidence: f64,
    /// `true` when no model output backs this prediction.
    pub is_default: bool,
}

impl WeaknessPrediction {
    /// Uniform prediction used when there is nothing to predict from.
    pub fn neutral() -> Self {
        Self {
            topic: Topic::Grammar,
            probabilities: Topic::ALL.map(|t| (t, 0.2)),
            confidence: 0.2,
            is_default: true,
        }
    }

    fn from_proba(proba: &[f64]) -> Result<Self> {
        if proba.len() != Topic::ALL.len() {
            return Err(Error::Model(format!(
                "weakness detector returned {} probabilities",
                proba.len()
            )));
        }
        let best = argmax(proba);
        let topic = Topic::from_index(best)
            .ok_or_else(|| Error::Model(format!("class {best} is not a topic")))?;
        Ok(Self {
            topic,
            probabilities: Topic::ALL.map(|t| (t, proba[t.index()])),
            confidence: proba[best],
            is_default: false,
        })
    }

    pub fn probability(&self, topic: Topic) -> f64 {
        self.probabilities[topic.index()].1
    }

    /// Topics from most to least likely weakness.
    pub fn ranked(&self) -> Vec<(Topic, f64)> {
        let mut ranked = self.probabilities.to_vec();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryPrediction {
    pub label: Trajectory,
    pub probabilities: [(Trajectory, f64); 3],
    pub is_default: bool,
}

impl TrajectoryPrediction {
    pub fn neutral() -> Self {
        Self {
            label: Trajectory::Stable,
            probabilities: Trajectory::ALL.map(|t| (t, 1.0 / 3.0)),
            is_default: true,
        }
    }

    fn from_proba(proba: &[f64]) -> Result<Self> {
        if proba.len() != Trajectory::ALL.len() {
            return Err(Error::Model(format!(
                "progress predictor returned {} probabilities",
                proba.len()
            )));
        }
        Ok(Self {
            label: Trajectory::ALL[argmax(proba)],
            probabilities: Trajectory::ALL.map(|t| (t, proba[t.index()])),
            is_default: false,
        })
    }

    pub fn probability(&self, label: Trajectory) -> f64 {
        self.probabilities[label.index()].1
    }

    pub fn improvement_probability(&self) -> f64 {
        self.probability(Trajectory::Improve)
    }
}

/// Predicts the weakest of the five topics.
#[derive(Debug, Clone)]
pub struct WeaknessClassifier {
    artifact: ModelArtifact,
}

impl WeaknessClassifier {
    pub fn new(artifact: ModelArtifact) -> Result<Self> {
        artifact.validate(ModelKind::Weakness)?;
        Ok(Self { artifact })
    }

    pub fn load(models_dir: &Path) -> Result<Self> {
        Self::new(ModelArtifact::load(models_dir, ModelKind::Weakness)?)
    }

    #[cfg(test)]
    pub(crate) fn unchecked(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn predict(&self, features: &[f64]) -> Result<WeaknessPrediction> {
        let proba = self.artifact.forest.predict_proba(features)?;
        let prediction = WeaknessPrediction::from_proba(&proba)?;
        debug!(topic = %prediction.topic, confidence = prediction.confidence, "weakness predicted");
        Ok(prediction)
    }
}

/// Predicts whether the next session declines, holds or improves.
#[derive(Debug, Clone)]
pub struct TrajectoryClassifier {
    artifact: ModelArtifact,
}

impl TrajectoryClassifier {
    pub fn new(artifact: ModelArtifact) -> Result<Self> {
        artifact.validate(ModelKind::Trajectory)?;
        Ok(Self { artifact })
    }

    pub fn load(models_dir: &Path) -> Result<Self> {
        Self::new(ModelArtifact::load(models_dir, ModelKind::Trajectory)?)
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn predict(&self, features: &[f64]) -> Result<TrajectoryPrediction> {
        let proba = self.artifact.forest.predict_proba(features)?;
        let prediction = TrajectoryPrediction::from_proba(&proba)?;
        debug!(label = %prediction.label, "trajectory predicted");
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::training::{train, TrainOptions};

    fn options() -> TrainOptions {
        TrainOptions {
            samples: Some(400),
            trees: Some(10),
            seed: None,
        }
    }

    #[test]
    fn neutral_predictions_are_uniform() {
        let w = WeaknessPrediction::neutral();
        assert!(w.is_default);
        assert_eq!(w.topic, Topic::Grammar);
        assert!((w.probabilities.iter().map(|p| p.1).sum::<f64>() - 1.0).abs() < 1e-12);

        let t = TrajectoryPrediction::neutral();
        assert_eq!(t.label, Trajectory::Stable);
        assert!((t.probabilities.iter().map(|p| p.1).sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weakness_prediction_is_a_distribution_over_five_topics() {
        let classifier = WeaknessClassifier::new(train(ModelKind::Weakness, &options()).unwrap()).unwrap();
        let row = [0.9, 0.85, 0.3, 0.35, 0.88, 12.0, 6.0, 3.0, 0.07, 0.66, 40.0];
        let p = classifier.predict(&row).unwrap();
        assert!(!p.is_default);
        assert_eq!(p.probabilities.len(), 5);
        assert!((p.probabilities.iter().map(|p| p.1).sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(p.confidence, p.probability(p.topic));
        assert_eq!(p.ranked()[0].0, p.topic);
    }

    #[test]
    fn trajectory_prediction_is_one_of_three() {
        let classifier =
            TrajectoryClassifier::new(train(ModelKind::Trajectory, &options()).unwrap()).unwrap();
        let p = classifier.predict(&[0.5, 6.0, 180.0, 1.5]).unwrap();
        assert!(Trajectory::ALL.contains(&p.label));
        assert!((p.probabilities.iter().map(|p| p.1).sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_rows_fail_validation() {
        let classifier =
            TrajectoryClassifier::new(train(ModelKind::Trajectory, &options()).unwrap()).unwrap();
        assert!(matches!(classifier.predict(&[0.5, 6.0]), Err(Error::Validation(_))));
        assert!(matches!(
            classifier.predict(&[0.5, f64::INFINITY, 180.0, 1.0]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn classifiers_reject_the_other_artifact() {
        let artifact = train(ModelKind::Trajectory, &options()).unwrap();
        assert!(WeaknessClassifier::new(artifact).is_err());
    }
}
