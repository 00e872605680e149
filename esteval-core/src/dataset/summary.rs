//! Judged per-condition statistics (`eval_analyzed.csv`).
//!
//! Columns: `attr, lvl, est`, then `{metric}.{max,min,pairs,var,rmse,median,mean,std}`
//! for `armse_p, armse_q, anees_p, anees_q`, then `failure`.

use serde::{Deserialize, Serialize};

use super::{parse_bool, parse_field, Dataset, DatasetError, TableRow};
use crate::domain::{ConditionKey, Metric};
use crate::stats::{Statistics, STAT_FIELDS};

pub const SUMMARY_COLUMNS: [&str; 36] = [
    "attr",
    "lvl",
    "est",
    "armse_p.max",
    "armse_p.min",
    "armse_p.pairs",
    "armse_p.var",
    "armse_p.rmse",
    "armse_p.median",
    "armse_p.mean",
    "armse_p.std",
    "armse_q.max",
    "armse_q.min",
    "armse_q.pairs",
    "armse_q.var",
    "armse_q.rmse",
    "armse_q.median",
    "armse_q.mean",
    "armse_q.std",
    "anees_p.max",
    "anees_p.min",
    "anees_p.pairs",
    "anees_p.var",
    "anees_p.rmse",
    "anees_p.median",
    "anees_p.mean",
    "anees_p.std",
    "anees_q.max",
    "anees_q.min",
    "anees_q.pairs",
    "anees_q.var",
    "anees_q.rmse",
    "anees_q.median",
    "anees_q.mean",
    "anees_q.std",
    "failure",
];

/// Statistics and verdict of one `(attr, lvl, est)` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub attr: i64,
    pub lvl: i64,
    pub est: String,
    pub armse_p: Statistics,
    pub armse_q: Statistics,
    /// Mean is divided by the state dimension; the other fields are raw.
    pub anees_p: Statistics,
    /// Mean is divided by the state dimension; the other fields are raw.
    pub anees_q: Statistics,
    pub failure: bool,
}

impl SummaryRow {
    pub fn condition(&self) -> ConditionKey {
        ConditionKey {
            attr: self.attr,
            lvl: self.lvl,
            est: self.est.clone(),
        }
    }

    pub fn stats(&self, metric: Metric) -> &Statistics {
        match metric {
            Metric::ArmseP => &self.armse_p,
            Metric::ArmseQ => &self.armse_q,
            Metric::AneesP => &self.anees_p,
            Metric::AneesQ => &self.anees_q,
        }
    }

    fn stats_mut(&mut self, metric: Metric) -> &mut Statistics {
        match metric {
            Metric::ArmseP => &mut self.armse_p,
            Metric::ArmseQ => &mut self.armse_q,
            Metric::AneesP => &mut self.anees_p,
            Metric::AneesQ => &mut self.anees_q,
        }
    }

    /// Number of runs that contributed after outlier removal.
    pub fn pairs(&self) -> usize {
        self.armse_p.pairs
    }
}

impl TableRow for SummaryRow {
    type Key = ConditionKey;

    fn columns() -> &'static [&'static str] {
        &SUMMARY_COLUMNS
    }

    fn key(&self) -> ConditionKey {
        self.condition()
    }

    fn to_record(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(SUMMARY_COLUMNS.len());
        out.push(self.attr.to_string());
        out.push(self.lvl.to_string());
        out.push(self.est.clone());
        for metric in Metric::ALL {
            let s = self.stats(metric);
            out.push(s.max.to_string());
            out.push(s.min.to_string());
            out.push(s.pairs.to_string());
            out.push(s.var.to_string());
            out.push(s.rmse.to_string());
            out.push(s.median.to_string());
            out.push(s.mean.to_string());
            out.push(s.std.to_string());
        }
        out.push(if self.failure { "True" } else { "False" }.to_string());
        out
    }

    fn from_record(fields: &[&str]) -> Result<Self, String> {
        if fields.len() != SUMMARY_COLUMNS.len() {
            return Err(format!(
                "expected {} fields, found {}",
                SUMMARY_COLUMNS.len(),
                fields.len()
            ));
        }
        let est = fields[2].trim();
        if est.is_empty() {
            return Err("column 'est': empty estimator id".into());
        }

        let mut row = SummaryRow {
            attr: parse_field(fields[0], "attr")?,
            lvl: parse_field(fields[1], "lvl")?,
            est: est.to_string(),
            armse_p: Statistics::default(),
            armse_q: Statistics::default(),
            anees_p: Statistics::default(),
            anees_q: Statistics::default(),
            failure: false,
        };

        for (m, metric) in Metric::ALL.iter().enumerate() {
            let base = 3 + m * STAT_FIELDS.len();
            let column = |i: usize| SUMMARY_COLUMNS[base + i];
            let float = |i: usize| parse_field::<f64>(fields[base + i], column(i));
            let pairs = parse_pairs(fields[base + 2], column(2))?;
            *row.stats_mut(*metric) = Statistics {
                max: float(0)?,
                min: float(1)?,
                pairs,
                var: float(3)?,
                rmse: float(4)?,
                median: float(5)?,
                mean: float(6)?,
                std: float(7)?,
            };
        }

        let last = fields[SUMMARY_COLUMNS.len() - 1];
        row.failure =
            parse_bool(last).ok_or_else(|| format!("column 'failure': cannot parse '{last}'"))?;
        Ok(row)
    }
}

/// `pairs` may have been written as a float by other tools (`23.0`).
fn parse_pairs(field: &str, column: &str) -> Result<usize, String> {
    if let Ok(n) = field.trim().parse::<usize>() {
        return Ok(n);
    }
    let value: f64 = parse_field(field, column)?;
    if value >= 0.0 && value.fract() == 0.0 && value.is_finite() {
        Ok(value as usize)
    } else {
        Err(format!("column '{column}': '{field}' is not a count"))
    }
}

/// Rows of `eval_analyzed.csv`, one per non-empty condition.
pub type SummaryDataset = Dataset<SummaryRow>;

impl Dataset<SummaryRow> {
    /// Look up the row of one condition.
    pub fn get(&self, attr: i64, lvl: i64, est: &str) -> Option<&SummaryRow> {
        self.iter()
            .find(|r| r.attr == attr && r.lvl == lvl && r.est == est)
    }

    /// Conditions judged as failing.
    pub fn failures(&self) -> Vec<&SummaryRow> {
        self.iter().filter(|r| r.failure).collect()
    }

    /// Pretty JSON array of all rows.
    pub fn to_json(&self) -> Result<String, DatasetError> {
        serde_json::to_string_pretty(self.rows()).map_err(|e| DatasetError::Format {
            origin: "<json>".into(),
            line: 0,
            reason: e.to_string(),
        })
    }
}
