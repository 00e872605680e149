//! Per-run checkpoint file (`report.ini`).
//!
//! Layout written by [`EvaluationReport::save`]:
//!
//! ```text
//! [EvaluationReport]
//! ARMSE_p = 0.0123
//! ARMSE_q = 0.51
//! ANEES_p = 3.2
//! ANEES_q = 2.9
//! alignment = se3
//! ```
//!
//! Reading is lenient about everything except the four metric keys: blank
//! lines, `#`/`;` comments and section headers are ignored, `:` works as a
//! separator, and keys match case-insensitively.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::{Metric, Metrics};

const SECTION: &str = "EvaluationReport";

/// Errors reading or writing a checkpoint.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read report {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed report {path}: {reason}")]
    Format { path: PathBuf, reason: String },
}

/// Metrics of one evaluated run, plus any other key/value pairs the evaluator recorded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationReport {
    pub metrics: Metrics,
    /// Non-metric entries, keyed as written in the file.
    pub extra: BTreeMap<String, String>,
}

impl EvaluationReport {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Load a checkpoint from disk.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let text = fs::read_to_string(path).map_err(|source| ReportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|reason| ReportError::Format {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse checkpoint text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut found: [Option<f64>; 4] = [None; 4];
        let mut extra = BTreeMap::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }
            let Some(sep) = line.find(['=', ':']) else {
                return Err(format!("line {}: expected 'key = value'", line_no + 1));
            };
            let key = line[..sep].trim();
            let value = line[sep + 1..].trim();

            match Metric::ALL
                .iter()
                .position(|m| m.report_key().eq_ignore_ascii_case(key))
            {
                Some(idx) => {
                    let parsed: f64 = value.parse().map_err(|_| {
                        format!("line {}: {key} = '{value}' is not a number", line_no + 1)
                    })?;
                    found[idx] = Some(parsed);
                }
                None => {
                    extra.insert(key.to_string(), value.to_string());
                }
            }
        }

        let mut metrics = Metrics::default();
        for (idx, metric) in Metric::ALL.iter().enumerate() {
            let value = found[idx].ok_or_else(|| format!("missing key {}", metric.report_key()))?;
            metrics.set(*metric, value);
        }

        Ok(Self { metrics, extra })
    }

    /// Render checkpoint text.
    pub fn render(&self) -> String {
        let mut out = format!("[{SECTION}]\n");
        for metric in Metric::ALL {
            out.push_str(&format!("{} = {}\n", metric.report_key(), self.metrics.get(metric)));
        }
        for (key, value) in &self.extra {
            out.push_str(&format!("{key} = {value}\n"));
        }
        out
    }

    /// Write the checkpoint, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        let write_err = |source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, self.render()).map_err(write_err)
    }
}
