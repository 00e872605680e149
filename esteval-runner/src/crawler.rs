//! Evaluation-tree traversal.
//!
//! Walks `root/ATTR_{a}/LVL_{l}/RUN_{r}/ATTR_{a}_LVL_{l}_RUN_{r}_EST_{e}.{ext}`,
//! reuses `RUN_{r}/{results_dir}/EST_{e}/{report_file}` when it exists, and
//! evaluates the artifact otherwise. Directory listings are sorted by name, so
//! two crawls of the same tree produce identical datasets.
//!
//! Failures below the root are absorbed: an unreadable directory, a name that
//! does not fit its template, or an artifact that fails to evaluate is logged,
//! counted in the [`CrawlSummary`], and skipped.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use esteval_core::{
    is_valid_estimator_id, template, EvaluationReport, Metrics, PathTemplate, RawResultRow,
    RawResultsDataset, RunKey, TemplateError,
};

use crate::config::{EvaluationConfig, LayoutConfig};
use crate::evaluator::{EvaluationRequest, RunEvaluator};

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("evaluation root {0} does not exist or is not a directory")]
    RootNotFound(PathBuf),

    #[error("failed to list {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// An artifact that produced no row.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFailure {
    pub artifact: PathBuf,
    pub reason: String,
}

/// Counters of one crawl.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlSummary {
    /// Artifacts whose names matched the template.
    pub artifacts: usize,
    /// Rows read from existing checkpoints.
    pub cache_hits: usize,
    /// Rows produced by the evaluator.
    pub evaluated: usize,
    /// Directory or file names that looked like tree entries but did not parse.
    pub skipped_entries: usize,
    pub failures: Vec<ArtifactFailure>,
}

impl CrawlSummary {
    pub fn rows(&self) -> usize {
        self.cache_hits + self.evaluated
    }
}

/// Dataset and counters of one crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlOutcome {
    pub dataset: RawResultsDataset,
    pub summary: CrawlSummary,
}

/// Crawls an evaluation tree into a [`RawResultsDataset`].
pub struct CorpusCrawler<'e> {
    layout: LayoutConfig,
    evaluation: EvaluationConfig,
    evaluator: &'e dyn RunEvaluator,
    attr_dir: PathTemplate,
    lvl_dir: PathTemplate,
    run_dir: PathTemplate,
    artifact: PathTemplate,
}

impl<'e> CorpusCrawler<'e> {
    pub fn new(
        layout: LayoutConfig,
        evaluation: EvaluationConfig,
        evaluator: &'e dyn RunEvaluator,
    ) -> Result<Self, CrawlError> {
        let artifact = PathTemplate::artifact(&layout.artifact_extension)?;
        Ok(Self {
            layout,
            evaluation,
            evaluator,
            attr_dir: PathTemplate::new(template::ATTR_DIR)?,
            lvl_dir: PathTemplate::new(template::LVL_DIR)?,
            run_dir: PathTemplate::new(template::RUN_DIR)?,
            artifact,
        })
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Crawl `root`. With `force_recompute`, existing checkpoints are ignored
    /// and every artifact is evaluated again.
    pub fn run(&self, root: &Path, force_recompute: bool) -> Result<CrawlOutcome, CrawlError> {
        if !root.is_dir() {
            return Err(CrawlError::RootNotFound(root.to_path_buf()));
        }
        log::info!("crawling {}", root.display());

        let mut dataset = RawResultsDataset::new();
        let mut summary = CrawlSummary::default();

        let attrs = list_sorted(root).map_err(|source| CrawlError::ReadDir {
            path: root.to_path_buf(),
            source,
        })?;
        for (attr_path, attr) in self.subdirs(attrs, "ATTR_", &self.attr_dir, &mut summary) {
            log::info!("ATTR {attr}");
            for (lvl_path, lvl) in self.children(&attr_path, "LVL_", &self.lvl_dir, &mut summary) {
                log::info!("  LVL {lvl}");
                for (run_path, run) in
                    self.children(&lvl_path, "RUN_", &self.run_dir, &mut summary)
                {
                    log::debug!("    RUN {run}");
                    self.crawl_run(
                        &run_path,
                        (attr, lvl, run),
                        force_recompute,
                        &mut dataset,
                        &mut summary,
                    );
                }
            }
        }

        log::info!(
            "crawl finished: {} artifacts, {} from checkpoints, {} evaluated, {} failed, {} skipped entries",
            summary.artifacts,
            summary.cache_hits,
            summary.evaluated,
            summary.failures.len(),
            summary.skipped_entries
        );
        Ok(CrawlOutcome { dataset, summary })
    }

    fn children(
        &self,
        dir: &Path,
        prefix: &str,
        template: &PathTemplate,
        summary: &mut CrawlSummary,
    ) -> Vec<(PathBuf, i64)> {
        match list_sorted(dir) {
            Ok(entries) => self.subdirs(entries, prefix, template, summary),
            Err(e) => {
                log::warn!("skipping {}: {e}", dir.display());
                summary.skipped_entries += 1;
                Vec::new()
            }
        }
    }

    /// Directories among `entries` named `{prefix}<int>`.
    fn subdirs(
        &self,
        entries: Vec<PathBuf>,
        prefix: &str,
        template: &PathTemplate,
        summary: &mut CrawlSummary,
    ) -> Vec<(PathBuf, i64)> {
        let mut out = Vec::new();
        for path in entries {
            if !path.is_dir() {
                continue;
            }
            let Some(name) = file_name(&path) else { continue };
            if !name.starts_with(prefix) {
                continue;
            }
            match template.parse(name).and_then(|p| p.int(0)) {
                Some(value) => out.push((path, value)),
                None => {
                    log::warn!("skipping {}: name does not match {}", path.display(), template.as_str());
                    summary.skipped_entries += 1;
                }
            }
        }
        out
    }

    fn crawl_run(
        &self,
        run_dir: &Path,
        dir_key: (i64, i64, i64),
        force_recompute: bool,
        dataset: &mut RawResultsDataset,
        summary: &mut CrawlSummary,
    ) {
        let entries = match list_sorted(run_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("skipping {}: {e}", run_dir.display());
                summary.skipped_entries += 1;
                return;
            }
        };

        let suffix = format!(".{}", self.layout.artifact_extension);
        for path in entries {
            if !path.is_file() {
                continue;
            }
            let Some(name) = file_name(&path) else { continue };
            if !name.ends_with(&suffix) {
                continue;
            }
            let Some(key) = self.artifact_key(name) else {
                log::warn!(
                    "skipping {}: name does not match {}",
                    path.display(),
                    self.artifact.as_str()
                );
                summary.skipped_entries += 1;
                continue;
            };
            summary.artifacts += 1;
            if (key.attr, key.lvl, key.run) != dir_key {
                log::warn!(
                    "{}: name says attr={} lvl={} run={}, directories say {:?}; using the name",
                    path.display(),
                    key.attr,
                    key.lvl,
                    key.run,
                    dir_key
                );
            }

            match self.process_artifact(&path, run_dir, &key, force_recompute) {
                Ok((metrics, from_checkpoint)) => {
                    match dataset.push(RawResultRow::new(key, metrics)) {
                        Ok(()) if from_checkpoint => summary.cache_hits += 1,
                        Ok(()) => summary.evaluated += 1,
                        Err(e) => fail(summary, &path, e.to_string()),
                    }
                }
                Err(reason) => fail(summary, &path, reason),
            }
        }
    }

    /// Run key of an artifact name; estimator ids that cannot be stored in a table do not match.
    fn artifact_key(&self, name: &str) -> Option<RunKey> {
        let params = self.artifact.parse(name)?;
        let est = params.get(3).filter(|e| is_valid_estimator_id(e))?;
        Some(RunKey {
            attr: params.int(0)?,
            lvl: params.int(1)?,
            run: params.int(2)?,
            est: est.to_string(),
        })
    }

    /// Metrics of one artifact and whether they came from an existing checkpoint.
    fn process_artifact(
        &self,
        artifact: &Path,
        run_dir: &Path,
        key: &RunKey,
        force_recompute: bool,
    ) -> Result<(Metrics, bool), String> {
        let result_dir = self.layout.checkpoint_dir(run_dir, &key.est);
        let report_path = result_dir.join(&self.layout.report_file);

        if report_path.is_file() && !force_recompute {
            let report = EvaluationReport::load(&report_path).map_err(|e| e.to_string())?;
            log::debug!("{key}: checkpoint {}", report_path.display());
            return validated(report.metrics).map(|m| (m, true));
        }

        log::info!("{key}: evaluating {}", artifact.display());
        let request = EvaluationRequest {
            key: key.clone(),
            artifact: artifact.to_path_buf(),
            gt_file: result_dir.join(&self.evaluation.gt_file),
            est_file: result_dir.join(&self.evaluation.est_file),
            report_path: report_path.clone(),
            result_dir,
            topics: self.evaluation.topics.clone(),
            alignment: self.evaluation.alignment_config(),
            plot: self.evaluation.plot,
            save_plot: self.evaluation.save_plot,
        };
        let report = self
            .evaluator
            .evaluate(&request)
            .map_err(|e| e.to_string())?;
        let metrics = validated(report.metrics)?;

        let on_disk = EvaluationReport::load(&report_path).ok();
        if on_disk.map(|r| r.metrics) != Some(report.metrics) {
            if let Err(e) = report.save(&report_path) {
                log::warn!("{key}: {e}");
            }
        }
        Ok((metrics, false))
    }
}

fn validated(metrics: Metrics) -> Result<Metrics, String> {
    match metrics.first_invalid() {
        Some(metric) => Err(format!(
            "{metric} is {} (metrics must be finite and non-negative)",
            metrics.get(metric)
        )),
        None => Ok(metrics),
    }
}

fn fail(summary: &mut CrawlSummary, artifact: &Path, reason: String) {
    log::warn!("skipping {}: {reason}", artifact.display());
    summary.failures.push(ArtifactFailure {
        artifact: artifact.to_path_buf(),
        reason,
    });
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn list_sorted(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{CheckpointOnly, EvaluationError};
    use esteval_core::SaveOptions;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn crawler(evaluator: &dyn RunEvaluator) -> CorpusCrawler<'_> {
        CorpusCrawler::new(LayoutConfig::default(), EvaluationConfig::default(), evaluator).unwrap()
    }

    #[test]
    fn missing_root_is_an_error() {
        let c = crawler(&CheckpointOnly);
        let err = c.run(Path::new("/definitely/not/here"), false).unwrap_err();
        assert!(matches!(err, CrawlError::RootNotFound(_)));
    }

    #[test]
    fn empty_root_yields_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = crawler(&CheckpointOnly).run(dir.path(), false).unwrap();
        assert!(outcome.dataset.is_empty());
        assert_eq!(outcome.summary, CrawlSummary::default());
    }

    #[test]
    fn malformed_names_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("ATTR_1").join("LVL_1").join("RUN_1");
        touch(&run.join("ATTR_1_LVL_1_RUN_x_EST_A.bag"));
        touch(&run.join("notes.txt"));
        fs::create_dir_all(dir.path().join("ATTR_one")).unwrap();

        let eval = |_: &EvaluationRequest| -> Result<EvaluationReport, EvaluationError> {
            Ok(EvaluationReport::new(Metrics::new(0.1, 0.2, 3.0, 3.0)))
        };
        let outcome = crawler(&eval).run(dir.path(), false).unwrap();
        assert!(outcome.dataset.is_empty());
        assert_eq!(outcome.summary.skipped_entries, 2);
        assert_eq!(outcome.summary.artifacts, 0);
    }

    #[test]
    fn estimator_ids_that_break_the_table_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("ATTR_1").join("LVL_1").join("RUN_1");
        touch(&run.join("ATTR_1_LVL_1_RUN_1_EST_my filter.bag"));
        touch(&run.join("ATTR_1_LVL_1_RUN_1_EST_v#2.bag"));
        touch(&run.join("ATTR_1_LVL_1_RUN_1_EST_ekf.bag"));

        let eval = |_: &EvaluationRequest| -> Result<EvaluationReport, EvaluationError> {
            Ok(EvaluationReport::new(Metrics::new(0.1, 0.2, 3.0, 3.0)))
        };
        let outcome = crawler(&eval).run(dir.path(), false).unwrap();
        assert_eq!(outcome.summary.skipped_entries, 2);
        assert_eq!(outcome.dataset.len(), 1);
        assert_eq!(outcome.dataset.rows()[0].est, "ekf");

        let text = outcome.dataset.to_text(SaveOptions::default()).unwrap();
        let reloaded = RawResultsDataset::parse(&text, "crawl").unwrap();
        assert_eq!(reloaded, outcome.dataset);
    }

    #[test]
    fn invalid_metrics_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("ATTR_1").join("LVL_1").join("RUN_1");
        touch(&run.join("ATTR_1_LVL_1_RUN_1_EST_A.bag"));

        let eval = |_: &EvaluationRequest| -> Result<EvaluationReport, EvaluationError> {
            Ok(EvaluationReport::new(Metrics::new(f64::NAN, 0.2, 3.0, 3.0)))
        };
        let outcome = crawler(&eval).run(dir.path(), false).unwrap();
        assert!(outcome.dataset.is_empty());
        assert_eq!(outcome.summary.failures.len(), 1);
        assert!(!run.join("RESULTS").join("EST_A").join("report.ini").exists());
    }
}
