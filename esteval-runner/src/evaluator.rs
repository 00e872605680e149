//! Evaluation of one run artifact on a cache miss.
//!
//! The crawler never computes trajectory metrics itself. It hands an
//! [`EvaluationRequest`] to a [`RunEvaluator`], which is expected to turn the
//! recorded artifact into a checkpoint. Closures implement the trait, so tests
//! and embedders can plug in their own evaluation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use esteval_core::{AlignmentConfig, EvaluationReport, ReportError, RunKey};

/// Errors produced while evaluating one artifact.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("no evaluator configured and no checkpoint at {0}")]
    NotConfigured(PathBuf),

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}")]
    CommandFailed { program: String, status: String },

    #[error("expected output {0} was not produced")]
    MissingOutput(PathBuf),

    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Everything an evaluator needs to know about one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub key: RunKey,
    pub artifact: PathBuf,
    /// Checkpoint directory of this run and estimator.
    pub result_dir: PathBuf,
    /// Checkpoint file inside `result_dir`.
    pub report_path: PathBuf,
    /// Ground-truth trajectory inside `result_dir`.
    pub gt_file: PathBuf,
    /// Estimated trajectory inside `result_dir`.
    pub est_file: PathBuf,
    pub topics: Vec<String>,
    pub alignment: AlignmentConfig,
    pub plot: bool,
    pub save_plot: bool,
}

/// Turns an artifact into metrics.
pub trait RunEvaluator {
    /// Evaluate one artifact. Implementations should leave a checkpoint at
    /// `request.report_path`; the crawler writes one from the returned report
    /// when they don't.
    fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationReport, EvaluationError>;
}

impl<F> RunEvaluator for F
where
    F: Fn(&EvaluationRequest) -> Result<EvaluationReport, EvaluationError>,
{
    fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationReport, EvaluationError> {
        self(request)
    }
}

/// Evaluator for trees whose checkpoints were all produced elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointOnly;

impl RunEvaluator for CheckpointOnly {
    fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationReport, EvaluationError> {
        Err(EvaluationError::NotConfigured(request.report_path.clone()))
    }
}

/// Runs external programs: an optional extraction step, then the evaluation
/// step, then reads the checkpoint it wrote.
///
/// Arguments may contain placeholders, replaced per request:
///
/// | placeholder   | value                                        |
/// |---------------|----------------------------------------------|
/// | `{artifact}`  | artifact path                                |
/// | `{result_dir}`| checkpoint directory                         |
/// | `{report}`    | checkpoint file                              |
/// | `{gt}`        | ground-truth trajectory file                 |
/// | `{est}`       | estimated trajectory file                    |
/// | `{topics}`    | topics; a bare `{topics}` expands to one arg each |
/// | `{alignment}` | alignment type (`se3`, ...)                  |
/// | `{frames}`    | alignment sample count                       |
/// | `{plot}`      | `true` / `false`                             |
/// | `{save_plot}` | `true` / `false`                             |
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvaluator {
    extract: Option<Vec<String>>,
    evaluate: Vec<String>,
}

impl CommandEvaluator {
    pub fn new(extract: Option<Vec<String>>, evaluate: Vec<String>) -> Self {
        Self { extract, evaluate }
    }

    fn run(&self, template: &[String], request: &EvaluationRequest) -> Result<(), EvaluationError> {
        let args = expand_args(template, request);
        let Some((program, rest)) = args.split_first() else {
            return Err(EvaluationError::CommandFailed {
                program: String::new(),
                status: "empty command line".into(),
            });
        };
        log::debug!("running {} {}", program, rest.join(" "));
        let status = Command::new(program)
            .args(rest)
            .status()
            .map_err(|source| EvaluationError::Spawn {
                program: program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(EvaluationError::CommandFailed {
                program: program.clone(),
                status: status.to_string(),
            })
        }
    }
}

impl RunEvaluator for CommandEvaluator {
    fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationReport, EvaluationError> {
        fs::create_dir_all(&request.result_dir).map_err(|source| EvaluationError::Io {
            path: request.result_dir.clone(),
            source,
        })?;

        if let Some(extract) = &self.extract {
            self.run(extract, request)?;
            require_file(&request.gt_file)?;
            require_file(&request.est_file)?;
        }

        self.run(&self.evaluate, request)?;
        require_file(&request.report_path)?;
        Ok(EvaluationReport::load(&request.report_path)?)
    }
}

fn require_file(path: &Path) -> Result<(), EvaluationError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(EvaluationError::MissingOutput(path.to_path_buf()))
    }
}

/// Substitute placeholders in every argument of `template`.
pub fn expand_args(template: &[String], request: &EvaluationRequest) -> Vec<String> {
    let mut out = Vec::with_capacity(template.len());
    for arg in template {
        if arg == "{topics}" {
            out.extend(request.topics.iter().cloned());
            continue;
        }
        out.push(expand(arg, request));
    }
    out
}

fn expand(arg: &str, request: &EvaluationRequest) -> String {
    let replacements = [
        ("{artifact}", request.artifact.display().to_string()),
        ("{result_dir}", request.result_dir.display().to_string()),
        ("{report}", request.report_path.display().to_string()),
        ("{gt}", request.gt_file.display().to_string()),
        ("{est}", request.est_file.display().to_string()),
        ("{topics}", request.topics.join(" ")),
        ("{alignment}", request.alignment.alignment_type.to_string()),
        ("{frames}", request.alignment.sample_count.to_string()),
        ("{plot}", request.plot.to_string()),
        ("{save_plot}", request.save_plot.to_string()),
    ];
    let mut s = arg.to_string();
    for (placeholder, value) in &replacements {
        if s.contains(placeholder) {
            s = s.replace(placeholder, value);
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use esteval_core::{AlignmentType, Metrics};

    fn request(root: &Path) -> EvaluationRequest {
        let result_dir = root.join("RESULTS").join("EST_ekf");
        EvaluationRequest {
            key: RunKey {
                attr: 1,
                lvl: 2,
                run: 3,
                est: "ekf".into(),
            },
            artifact: root.join("ATTR_1_LVL_2_RUN_3_EST_ekf.bag"),
            report_path: result_dir.join("report.ini"),
            gt_file: result_dir.join("pose-gt.csv"),
            est_file: result_dir.join("pose-est-cov.csv"),
            result_dir,
            topics: vec!["/pose_gt".into(), "/pose_est".into()],
            alignment: AlignmentConfig {
                alignment_type: AlignmentType::PosYaw,
                sample_count: 50,
            },
            plot: false,
            save_plot: true,
        }
    }

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn placeholders_are_expanded() {
        let req = request(Path::new("/run"));
        let out = expand_args(
            &args(&["tool", "--align={alignment}", "-n", "{frames}", "{topics}", "{plot}/{save_plot}"]),
            &req,
        );
        assert_eq!(
            out,
            args(&["tool", "--align=posyaw", "-n", "50", "/pose_gt", "/pose_est", "false/true"])
        );
    }

    #[test]
    fn embedded_topics_join_with_spaces() {
        let req = request(Path::new("/run"));
        let out = expand_args(&args(&["--topics={topics}", "{gt}"]), &req);
        assert_eq!(out[0], "--topics=/pose_gt /pose_est");
        assert_eq!(out[1], "/run/RESULTS/EST_ekf/pose-gt.csv");
    }

    #[test]
    fn checkpoint_only_refuses() {
        let req = request(Path::new("/run"));
        assert!(matches!(
            CheckpointOnly.evaluate(&req),
            Err(EvaluationError::NotConfigured(_))
        ));
    }

    #[test]
    fn closures_are_evaluators() {
        let eval = |_: &EvaluationRequest| Ok(EvaluationReport::new(Metrics::new(1.0, 2.0, 3.0, 4.0)));
        let report = eval.evaluate(&request(Path::new("/run"))).unwrap();
        assert_eq!(report.metrics.anees_q, 4.0);
    }

    #[cfg(unix)]
    #[test]
    fn command_evaluator_extracts_then_reads_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());
        let evaluator = CommandEvaluator::new(
            Some(args(&["sh", "-c", "touch \"$0\" \"$1\"", "{gt}", "{est}"])),
            args(&[
                "sh",
                "-c",
                "printf 'ARMSE_p = 0.5\\nARMSE_q = 1.5\\nANEES_p = 3\\nANEES_q = 2.5\\n' > \"$0\"",
                "{report}",
            ]),
        );
        let report = evaluator.evaluate(&req).unwrap();
        assert_eq!(report.metrics, Metrics::new(0.5, 1.5, 3.0, 2.5));
        assert!(req.gt_file.is_file());
        assert!(req.report_path.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn command_evaluator_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(dir.path());

        let failing = CommandEvaluator::new(None, args(&["sh", "-c", "exit 3"]));
        assert!(matches!(
            failing.evaluate(&req),
            Err(EvaluationError::CommandFailed { .. })
        ));

        let silent = CommandEvaluator::new(None, args(&["true"]));
        assert!(matches!(
            silent.evaluate(&req),
            Err(EvaluationError::MissingOutput(_))
        ));

        let missing = CommandEvaluator::new(None, args(&["esteval-no-such-program-xyz"]));
        assert!(matches!(
            missing.evaluate(&req),
            Err(EvaluationError::Spawn { .. })
        ));
    }
}
