//! Learner analytics: feature engineering, random-forest classifiers and the
//! student report.

pub mod analyzer;
pub mod artifact;
pub mod features;
pub mod forest;
pub mod predict;
pub mod training;

pub use analyzer::{Analysis, Analyzer, Priority, Recommendation, StudentReport};
pub use artifact::{CrossValidation, ModelArtifact, ModelKind};
pub use features::LearnerFeatures;
pub use forest::{ForestParams, RandomForest};
pub use predict::{
    Trajectory, TrajectoryClassifier, TrajectoryPrediction, WeaknessClassifier, WeaknessPrediction,
};
pub use training::{evaluate, train, Evaluation, EvaluationStatus, TrainOptions};
