//! On-disk model artifacts (JSON).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::ml::features::{TRAJECTORY_FEATURES, WEAKNESS_FEATURES};
use crate::ml::forest::RandomForest;
use crate::ml::predict::Trajectory;
use crate::realm::Topic;

/// Artifact format version.
pub const ARTIFACT_VERSION: &str = "2.0";

/// The two shipped classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Weakness,
    Trajectory,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Weakness, ModelKind::Trajectory];

    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::Weakness => "weakness_detector.json",
            ModelKind::Trajectory => "progress_predictor.json",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Weakness => "weakness detector",
            ModelKind::Trajectory => "progress predictor",
        }
    }

    pub fn feature_columns(&self) -> &'static [&'static str] {
        match self {
            ModelKind::Weakness => &WEAKNESS_FEATURES,
            ModelKind::Trajectory => &TRAJECTORY_FEATURES,
        }
    }

    pub fn labels(&self) -> Vec<&'static str> {
        match self {
            ModelKind::Weakness => Topic::ALL.iter().map(|t| t.as_str()).collect(),
            ModelKind::Trajectory => Trajectory::ALL.iter().map(|t| t.as_str()).collect(),
        }
    }

    pub fn path_in(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(self.file_name())
    }
}

/// Stratified k-fold accuracy measured on the training split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub folds: usize,
    pub mean: f64,
    pub std: f64,
}

/// A trained forest plus the metadata needed to trust it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub kind: ModelKind,
    pub trained_at: DateTime<Utc>,
    pub feature_columns: Vec<String>,
    pub labels: Vec<String>,
    pub training_accuracy: f64,
    pub test_accuracy: f64,
    pub sample_size: usize,
    /// Absent in artifacts written before cross-validation was recorded.
    #[serde(default)]
    pub cross_validation: Option<CrossValidation>,
    pub forest: RandomForest,
}

impl ModelArtifact {
    pub fn new(
        kind: ModelKind,
        forest: RandomForest,
        training_accuracy: f64,
        test_accuracy: f64,
        sample_size: usize,
    ) -> Self {
        Self {
            version: ARTIFACT_VERSION.to_string(),
            kind,
            trained_at: Utc::now(),
            feature_columns: kind.feature_columns().iter().map(|c| c.to_string()).collect(),
            labels: kind.labels().into_iter().map(String::from).collect(),
            training_accuracy,
            test_accuracy,
            sample_size,
            cross_validation: None,
            forest,
        }
    }

    /// Feature names paired with their importance, most important first.
    pub fn ranked_importances(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .feature_columns
            .iter()
            .map(String::as_str)
            .zip(self.forest.feature_importances())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Check that the artifact has the shape its classifier expects.
    pub fn validate(&self, expected: ModelKind) -> Result<()> {
        if self.kind != expected {
            return Err(Error::Model(format!(
                "expected a {} artifact, found a {}",
                expected.display_name(),
                self.kind.display_name()
            )));
        }
        let labels = expected.labels();
        if self.labels != labels || self.forest.n_classes() != labels.len() {
            return Err(Error::Model(format!(
                "{} labels {:?} do not match {:?}",
                expected.display_name(),
                self.labels,
                labels
            )));
        }
        let columns = expected.feature_columns();
        if self.feature_columns != columns || self.forest.n_features() != columns.len() {
            return Err(Error::Model(format!(
                "{} has {} features, expected {}",
                expected.display_name(),
                self.forest.n_features(),
                columns.len()
            )));
        }
        self.forest.validate()
    }

    /// Write the artifact into `models_dir` under its standard file name.
    pub fn save(&self, models_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(models_dir)?;
        let path = self.kind.path_in(models_dir);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        info!(model = self.kind.display_name(), path = %path.display(), "model saved");
        Ok(path)
    }

    /// Read and validate the artifact of `kind` from `models_dir`.
    pub fn load(models_dir: &Path, kind: ModelKind) -> Result<Self> {
        let path = kind.path_in(models_dir);
        if !path.exists() {
            return Err(Error::MissingData(path));
        }
        let artifact: ModelArtifact = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
        artifact.validate(kind)?;
        Ok(artifact)
    }
}
