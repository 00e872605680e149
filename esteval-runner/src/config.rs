//! Serializable evaluation configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is a valid configuration. CLI flags are applied on top by
//! the binary.
//!
//! ```toml
//! [layout]
//! results_dir = "RESULTS"
//! report_file = "report.ini"
//! artifact_extension = "bag"
//!
//! [evaluation]
//! alignment = "se3"
//! frames = -1
//! extract = ["bag2csv", "{artifact}", "{result_dir}", "{topics}"]
//! evaluate = ["traj-eval", "--gt", "{gt}", "--est", "{est}", "--out", "{result_dir}"]
//!
//! [judgement]
//! position = 1.0
//! orientation = 5.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use esteval_core::{AlignmentConfig, AlignmentType};

use crate::analyzer::Thresholds;
use crate::evaluator::{CheckpointOnly, CommandEvaluator, RunEvaluator};

/// Errors loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub layout: LayoutConfig,
    pub evaluation: EvaluationConfig,
    pub judgement: JudgementConfig,
}

/// Names used inside the evaluation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Directory next to the artifacts that holds one checkpoint dir per estimator.
    pub results_dir: String,
    /// Checkpoint file name inside `{results_dir}/EST_{est}/`.
    pub report_file: String,
    /// Extension of per-run artifacts, without the dot.
    pub artifact_extension: String,
    /// Raw results table written at the tree root.
    pub raw_results_file: String,
    /// Summary table written at the tree root.
    pub summary_file: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            results_dir: "RESULTS".into(),
            report_file: "report.ini".into(),
            artifact_extension: "bag".into(),
            raw_results_file: "eval.csv".into(),
            summary_file: "eval_analyzed.csv".into(),
        }
    }
}

impl LayoutConfig {
    /// Checkpoint directory of estimator `est` for artifacts in `run_dir`.
    pub fn checkpoint_dir(&self, run_dir: &Path, est: &str) -> PathBuf {
        run_dir.join(&self.results_dir).join(format!("EST_{est}"))
    }

    /// Checkpoint file of estimator `est` for artifacts in `run_dir`.
    pub fn report_path(&self, run_dir: &Path, est: &str) -> PathBuf {
        self.checkpoint_dir(run_dir, est).join(&self.report_file)
    }
}

/// How cache misses are evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub alignment: AlignmentType,
    /// Samples used for alignment, `-1` for all.
    pub frames: i64,
    /// Ground-truth trajectory file written by extraction.
    pub gt_file: String,
    /// Estimated trajectory file written by extraction.
    pub est_file: String,
    /// Recorded topics to extract, ground truth first.
    pub topics: Vec<String>,
    /// Extraction command line (artifact to trajectory files).
    pub extract: Option<Vec<String>>,
    /// Evaluation command line (trajectory files to checkpoint).
    pub evaluate: Option<Vec<String>>,
    pub plot: bool,
    pub save_plot: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentType::Se3,
            frames: -1,
            gt_file: "pose-gt.csv".into(),
            est_file: "pose-est-cov.csv".into(),
            topics: vec!["/pose_gt".into(), "/pose_est".into()],
            extract: None,
            evaluate: None,
            plot: false,
            save_plot: false,
        }
    }
}

impl EvaluationConfig {
    pub fn alignment_config(&self) -> AlignmentConfig {
        AlignmentConfig {
            alignment_type: self.alignment,
            sample_count: self.frames,
        }
    }

    /// Evaluator for cache misses: external commands when configured, otherwise none.
    pub fn evaluator(&self) -> Box<dyn RunEvaluator> {
        match &self.evaluate {
            Some(evaluate) => Box::new(CommandEvaluator::new(
                self.extract.clone(),
                evaluate.clone(),
            )),
            None => Box::new(CheckpointOnly),
        }
    }
}

/// Default judgement thresholds; the CLI requires them explicitly anyway.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgementConfig {
    /// Position ARMSE threshold [m].
    pub position: Option<f64>,
    /// Orientation ARMSE threshold [deg].
    pub orientation: Option<f64>,
}

impl EvalConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Thresholds from the `[judgement]` section, if both are set.
    pub fn thresholds(&self) -> Option<Thresholds> {
        Some(Thresholds::new(
            self.judgement.position?,
            self.judgement.orientation?,
        ))
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;
        for (name, value) in [
            ("layout.results_dir", &layout.results_dir),
            ("layout.report_file", &layout.report_file),
            ("layout.artifact_extension", &layout.artifact_extension),
            ("layout.raw_results_file", &layout.raw_results_file),
            ("layout.summary_file", &layout.summary_file),
            ("evaluation.gt_file", &self.evaluation.gt_file),
            ("evaluation.est_file", &self.evaluation.est_file),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        if layout.artifact_extension.contains(['{', '}']) {
            return Err(ConfigError::Invalid(
                "layout.artifact_extension must not contain braces".into(),
            ));
        }
        if self.evaluation.frames < -1 {
            return Err(ConfigError::Invalid(format!(
                "evaluation.frames must be -1 (all) or a sample count, got {}",
                self.evaluation.frames
            )));
        }
        for (name, cmd) in [
            ("evaluation.extract", &self.evaluation.extract),
            ("evaluation.evaluate", &self.evaluation.evaluate),
        ] {
            if matches!(cmd, Some(args) if args.is_empty()) {
                return Err(ConfigError::Invalid(format!("{name} must name a program")));
            }
        }
        if let Some(thresholds) = self.thresholds() {
            thresholds.validate().map_err(ConfigError::Invalid)?;
        }
        Ok(())
    }
}
