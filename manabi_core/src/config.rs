//! Runtime configuration: optional TOML file, then environment overrides.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::progress::PASS_THRESHOLD;
use crate::session::DEFAULT_CHAPTER_SIZE;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "manabi.toml";
pub const QUESTIONS_FILE: &str = "manabifun_questions.csv";
pub const SCORES_FILE: &str = "student_scores.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_questions_path")]
    pub questions_path: PathBuf,
    #[serde(default = "default_scores_path")]
    pub scores_path: PathBuf,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Questions drawn per chapter run.
    #[serde(default = "default_chapter_size")]
    pub chapter_size: usize,
    /// Percent needed to pass a chapter.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// Train and save missing models at startup.
    #[serde(default)]
    pub auto_train: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_port() -> u16 {
    8501
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_questions_path() -> PathBuf {
    Path::new("data").join(QUESTIONS_FILE)
}
fn default_scores_path() -> PathBuf {
    Path::new("data").join(SCORES_FILE)
}
fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_chapter_size() -> usize {
    DEFAULT_CHAPTER_SIZE
}
fn default_pass_threshold() -> f64 {
    PASS_THRESHOLD
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            questions_path: default_questions_path(),
            scores_path: default_scores_path(),
            models_dir: default_models_dir(),
            chapter_size: default_chapter_size(),
            pass_threshold: default_pass_threshold(),
            auto_train: false,
        }
    }
}

impl Config {
    /// Read `path`, or `manabi.toml` if present, or fall back to defaults;
    /// then apply `MANABI_*` / `RUST_LOG` overrides from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if !path.exists() => return Err(Error::MissingData(path.to_path_buf())),
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        debug!(path = %path.display(), "config file read");
        Ok(config)
    }

    /// Apply environment-style overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("MANABI_HOST").and_then(|v| v.parse().ok()) {
            self.host = host;
        }
        if let Some(port) = lookup("MANABI_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(level) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
        if let Some(dir) = lookup("MANABI_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            let dir = PathBuf::from(dir);
            self.questions_path = dir.join(QUESTIONS_FILE);
            self.scores_path = dir.join(SCORES_FILE);
        }
        if let Some(dir) = lookup("MANABI_MODELS_DIR").filter(|v| !v.trim().is_empty()) {
            self.models_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chapter_size == 0 {
            return Err(Error::Validation("chapter_size must be at least 1".to_string()));
        }
        if !(0.0..=100.0).contains(&self.pass_threshold) {
            return Err(Error::Validation(format!(
                "pass_threshold {} is not a percentage",
                self.pass_threshold
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manabi.toml");
        std::fs::write(&path, "port = 9000\nauto_train = true\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.auto_train);
        assert_eq!(config.chapter_size, 10);
        assert_eq!(config.questions_path, Path::new("data/manabifun_questions.csv"));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("MANABI_PORT", "7000"),
            ("MANABI_HOST", "0.0.0.0"),
            ("MANABI_DATA_DIR", "/srv/manabi"),
            ("MANABI_MODELS_DIR", "/srv/models"),
            ("RUST_LOG", "debug"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 7000);
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:7000");
        assert_eq!(config.scores_path, Path::new("/srv/manabi/student_scores.csv"));
        assert_eq!(config.models_dir, Path::new("/srv/models"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn bad_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == "MANABI_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.port, 8501);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = Config {
            pass_threshold: 120.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        let config = Config {
            chapter_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::MissingData(_)));
    }

    #[test]
    fn shipped_example_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("manabi.example.toml");
        let config = Config::from_file(&path).unwrap();
        config.validate().unwrap();
        assert!(config.auto_train);
        assert_eq!(config.pass_threshold, 89.0);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manabi.toml");
        std::fs::write(&path, "port = \"many\"").unwrap();
        assert!(matches!(Config::from_file(&path), Err(Error::Toml(_))));
    }
}
