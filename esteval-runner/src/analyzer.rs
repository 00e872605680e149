//! Per-condition statistics and pass/fail judgement.
//!
//! Raw rows are grouped by `(attr, lvl, est)`, outliers are rejected within
//! each group, and the survivors are summarized into one [`SummaryRow`] per
//! non-empty group.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use esteval_core::{
    ConditionKey, Metric, Metrics, RawResultRow, RawResultsDataset, Statistics, SummaryDataset,
    SummaryRow, STATE_DIMENSION,
};

use crate::outlier::reject_outliers;

/// Failure thresholds on the mean ARMSE of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Position threshold [m].
    pub position: f64,
    /// Orientation threshold [deg].
    pub orientation: f64,
}

impl Thresholds {
    pub fn new(position: f64, orientation: f64) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [("position", self.position), ("orientation", self.orientation)] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!(
                    "{name} threshold must be finite and non-negative, got {value}"
                ));
            }
        }
        Ok(())
    }

    /// Failure if either mean strictly exceeds its threshold. A NaN mean fails.
    pub fn is_failure(&self, armse_p_mean: f64, armse_q_mean: f64) -> bool {
        !(armse_p_mean <= self.position) || !(armse_q_mean <= self.orientation)
    }
}

/// A group whose metrics could not be normalized; its statistics cover all runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegenerateGroup {
    pub key: ConditionKey,
    pub metric: Metric,
}

/// Output of [`EvaluationAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub summary: SummaryDataset,
    /// Groups analyzed without outlier rejection.
    pub degenerate: Vec<DegenerateGroup>,
}

impl Analysis {
    pub fn failures(&self) -> Vec<&SummaryRow> {
        self.summary.failures()
    }
}

/// One raw row with per-condition averages attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedRun {
    pub row: RawResultRow,
    /// Plain means over every run of the row's condition (`aarmse_p`, ...).
    pub averages: Metrics,
}

#[derive(Debug, Clone)]
pub struct EvaluationAnalyzer {
    thresholds: Thresholds,
}

impl EvaluationAnalyzer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Summarize every non-empty `(attr, lvl, est)` group in sorted key order.
    pub fn analyze(&self, raw: &RawResultsDataset) -> Analysis {
        let mut summary = SummaryDataset::new();
        let mut degenerate = Vec::new();

        for (key, rows) in group_by_condition(raw) {
            let (row, bad_metric) = self.summarize_group(&key, &rows);
            if let Some(metric) = bad_metric {
                log::warn!(
                    "{key}: {metric} is not normalizable, skipping outlier rejection for {} runs",
                    rows.len()
                );
                degenerate.push(DegenerateGroup {
                    key: key.clone(),
                    metric,
                });
            }
            log::debug!(
                "{key}: pairs={} armse_p.mean={:.4} armse_q.mean={:.4} failure={}",
                row.pairs(),
                row.armse_p.mean,
                row.armse_q.mean,
                row.failure
            );
            if let Err(e) = summary.push(row) {
                log::error!("{e}");
            }
        }

        log::info!(
            "analyzed {} conditions from {} runs ({} failing)",
            summary.len(),
            raw.len(),
            summary.failures().len()
        );
        Analysis {
            summary,
            degenerate,
        }
    }

    /// Statistics and verdict of one group. `rows` must not be empty.
    ///
    /// Returns the metric that made the group degenerate, if any.
    pub fn summarize_group(
        &self,
        key: &ConditionKey,
        rows: &[&RawResultRow],
    ) -> (SummaryRow, Option<Metric>) {
        let rejection = reject_outliers(rows);
        if !rejection.removed.is_empty() {
            let runs: Vec<i64> = rejection.removed.iter().map(|r| r.run).collect();
            log::debug!("{key}: removed outlier runs {runs:?}");
        }

        let stats = |metric: Metric| {
            let values: Vec<f64> = rejection
                .kept
                .iter()
                .map(|r| r.metrics.get(metric))
                .collect();
            let mut s = Statistics::from_values(&values);
            if metric.is_consistency() {
                s.mean /= STATE_DIMENSION;
            }
            s
        };

        let armse_p = stats(Metric::ArmseP);
        let armse_q = stats(Metric::ArmseQ);
        let failure = self.thresholds.is_failure(armse_p.mean, armse_q.mean);
        let row = SummaryRow {
            attr: key.attr,
            lvl: key.lvl,
            est: key.est.clone(),
            armse_p,
            armse_q,
            anees_p: stats(Metric::AneesP),
            anees_q: stats(Metric::AneesQ),
            failure,
        };
        (row, rejection.degenerate)
    }
}

/// Convenience wrapper around [`EvaluationAnalyzer::analyze`].
pub fn analyze(raw: &RawResultsDataset, position: f64, orientation: f64) -> Analysis {
    EvaluationAnalyzer::new(Thresholds::new(position, orientation)).analyze(raw)
}

/// Raw rows grouped by condition, row order preserved within each group.
pub fn group_by_condition(raw: &RawResultsDataset) -> BTreeMap<ConditionKey, Vec<&RawResultRow>> {
    let mut groups: BTreeMap<ConditionKey, Vec<&RawResultRow>> = BTreeMap::new();
    for row in raw {
        groups.entry(row.condition()).or_default().push(row);
    }
    groups
}

/// Rows of one condition sorted by run, each with the condition's plain means.
pub fn average_over_runs(
    raw: &RawResultsDataset,
    attr: i64,
    lvl: i64,
    est: &str,
) -> Vec<AveragedRun> {
    let mut rows: Vec<&RawResultRow> = raw.rows_at(attr, lvl, Some(est));
    rows.sort_by_key(|r| r.run);
    with_averages(&rows)
}

/// [`average_over_runs`] for every condition, in sorted condition order.
pub fn average_all(raw: &RawResultsDataset) -> Vec<AveragedRun> {
    group_by_condition(raw)
        .into_values()
        .flat_map(|mut rows| {
            rows.sort_by_key(|r| r.run);
            with_averages(&rows)
        })
        .collect()
}

fn with_averages(rows: &[&RawResultRow]) -> Vec<AveragedRun> {
    if rows.is_empty() {
        return Vec::new();
    }
    let n = rows.len() as f64;
    let mut averages = Metrics::default();
    for metric in Metric::ALL {
        let sum: f64 = rows.iter().map(|r| r.metrics.get(metric)).sum();
        averages.set(metric, sum / n);
    }
    rows.iter()
        .map(|r| AveragedRun {
            row: (*r).clone(),
            averages,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use esteval_core::RunKey;

    fn row(attr: i64, lvl: i64, run: i64, est: &str, m: [f64; 4]) -> RawResultRow {
        RawResultRow::new(
            RunKey {
                attr,
                lvl,
                run,
                est: est.into(),
            },
            Metrics::new(m[0], m[1], m[2], m[3]),
        )
    }

    #[test]
    fn judgement_is_strict() {
        let t = Thresholds::new(1.0, 5.0);
        assert!(!t.is_failure(1.0, 5.0));
        assert!(t.is_failure(1.000001, 0.0));
        assert!(t.is_failure(0.0, 5.000001));
    }

    #[test]
    fn non_finite_means_never_pass() {
        let t = Thresholds::new(1.0, 5.0);
        assert!(t.is_failure(f64::NAN, 0.0));
        assert!(t.is_failure(0.0, f64::NAN));
        assert!(t.is_failure(f64::INFINITY, 0.0));
    }

    #[test]
    fn nan_group_is_degenerate_and_failing() {
        let raw = RawResultsDataset::from_rows(vec![
            row(1, 1, 1, "A", [f64::NAN, 0.1, 3.0, 3.0]),
            row(1, 1, 2, "A", [f64::NAN, 0.1, 3.0, 3.0]),
        ])
        .unwrap();
        let analysis = analyze(&raw, 1.0, 5.0);
        assert_eq!(analysis.degenerate.len(), 1);
        assert_eq!(analysis.degenerate[0].metric, Metric::ArmseP);
        let s = analysis.summary.get(1, 1, "A").unwrap();
        assert!(s.armse_p.mean.is_nan());
        assert!(s.failure);
    }

    #[test]
    fn threshold_validation() {
        assert!(Thresholds::new(1.0, 5.0).validate().is_ok());
        assert!(Thresholds::new(-0.1, 5.0).validate().is_err());
        assert!(Thresholds::new(1.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn anees_mean_is_divided_by_state_dimension() {
        let raw = RawResultsDataset::from_rows(vec![row(1, 1, 1, "A", [0.1, 0.1, 3.0, 6.0])]).unwrap();
        let analysis = analyze(&raw, 1.0, 5.0);
        let s = analysis.summary.get(1, 1, "A").unwrap();
        assert_eq!(s.anees_p.mean, 1.0);
        assert_eq!(s.anees_q.mean, 2.0);
        assert_eq!(s.anees_q.max, 6.0);
        assert_eq!(s.armse_p.mean, 0.1);
        assert_eq!(s.pairs(), 1);
    }

    #[test]
    fn groups_are_emitted_in_sorted_order() {
        let raw = RawResultsDataset::from_rows(vec![
            row(2, 1, 1, "B", [0.1, 0.1, 3.0, 3.0]),
            row(1, 2, 1, "A", [0.1, 0.1, 3.0, 3.0]),
            row(1, 1, 1, "B", [0.1, 0.1, 3.0, 3.0]),
            row(1, 1, 2, "A", [0.1, 0.1, 3.0, 3.0]),
        ])
        .unwrap();
        let analysis = analyze(&raw, 1.0, 5.0);
        let keys: Vec<(i64, i64, String)> = analysis
            .summary
            .iter()
            .map(|r| (r.attr, r.lvl, r.est.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (1, 1, "A".to_string()),
                (1, 1, "B".to_string()),
                (1, 2, "A".to_string()),
                (2, 1, "B".to_string()),
            ]
        );
    }

    #[test]
    fn degenerate_group_is_reported_and_unfiltered() {
        let raw = RawResultsDataset::from_rows(vec![
            row(1, 1, 1, "A", [0.1, 0.1, 3.0, -1.0]),
            row(1, 1, 2, "A", [0.9, 0.1, 3.0, 3.0]),
        ])
        .unwrap();
        let analysis = analyze(&raw, 1.0, 5.0);
        assert_eq!(analysis.degenerate.len(), 1);
        assert_eq!(analysis.degenerate[0].metric, Metric::AneesQ);
        assert_eq!(analysis.summary.get(1, 1, "A").unwrap().pairs(), 2);
    }

    #[test]
    fn averages_are_plain_means_sorted_by_run() {
        let raw = RawResultsDataset::from_rows(vec![
            row(1, 1, 3, "A", [3.0, 1.0, 3.0, 3.0]),
            row(1, 1, 1, "A", [1.0, 1.0, 3.0, 3.0]),
            row(1, 1, 2, "B", [9.0, 9.0, 9.0, 9.0]),
        ])
        .unwrap();
        let runs = average_over_runs(&raw, 1, 1, "A");
        assert_eq!(runs.iter().map(|r| r.row.run).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(runs[0].averages.armse_p, 2.0);
        assert_eq!(runs[1].averages.anees_p, 3.0);

        let all = average_all(&raw);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].row.est, "B");
        assert_eq!(all[2].averages.armse_q, 9.0);
    }
}
