//! Raw per-run results: `attr, lvl, run, est, armse_p, armse_q, anees_p, anees_q`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{parse_field, Dataset, TableRow};
use crate::domain::{ConditionKey, Metric, Metrics, RunKey};

pub const RAW_COLUMNS: [&str; 8] = [
    "attr", "lvl", "run", "est", "armse_p", "armse_q", "anees_p", "anees_q",
];

/// Outcome of one evaluated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResultRow {
    pub attr: i64,
    pub lvl: i64,
    pub run: i64,
    pub est: String,
    pub metrics: Metrics,
}

impl RawResultRow {
    pub fn new(key: RunKey, metrics: Metrics) -> Self {
        Self {
            attr: key.attr,
            lvl: key.lvl,
            run: key.run,
            est: key.est,
            metrics,
        }
    }

    pub fn run_key(&self) -> RunKey {
        RunKey {
            attr: self.attr,
            lvl: self.lvl,
            run: self.run,
            est: self.est.clone(),
        }
    }

    pub fn condition(&self) -> ConditionKey {
        ConditionKey {
            attr: self.attr,
            lvl: self.lvl,
            est: self.est.clone(),
        }
    }

    pub fn matches(&self, attr: i64, lvl: i64, est: Option<&str>) -> bool {
        self.attr == attr && self.lvl == lvl && est.map_or(true, |e| self.est == e)
    }
}

impl TableRow for RawResultRow {
    type Key = RunKey;

    fn columns() -> &'static [&'static str] {
        &RAW_COLUMNS
    }

    fn key(&self) -> RunKey {
        self.run_key()
    }

    fn to_record(&self) -> Vec<String> {
        let mut out = vec![
            self.attr.to_string(),
            self.lvl.to_string(),
            self.run.to_string(),
            self.est.clone(),
        ];
        out.extend(Metric::ALL.iter().map(|m| self.metrics.get(*m).to_string()));
        out
    }

    fn from_record(fields: &[&str]) -> Result<Self, String> {
        if fields.len() != RAW_COLUMNS.len() {
            return Err(format!("expected {} fields, found {}", RAW_COLUMNS.len(), fields.len()));
        }
        let est = fields[3].trim();
        if est.is_empty() {
            return Err("column 'est': empty estimator id".into());
        }
        let mut metrics = Metrics::default();
        for (i, metric) in Metric::ALL.iter().enumerate() {
            metrics.set(*metric, parse_field(fields[4 + i], metric.column())?);
        }
        if let Some(metric) = metrics.first_invalid() {
            return Err(format!(
                "column '{}': {} is not a finite non-negative value",
                metric.column(),
                metrics.get(metric)
            ));
        }
        Ok(Self {
            attr: parse_field(fields[0], "attr")?,
            lvl: parse_field(fields[1], "lvl")?,
            run: parse_field(fields[2], "run")?,
            est: est.to_string(),
            metrics,
        })
    }
}

/// Rows of `eval.csv`, one per successfully evaluated run.
pub type RawResultsDataset = Dataset<RawResultRow>;

impl Dataset<RawResultRow> {
    pub fn attr_values(&self) -> Vec<i64> {
        unique(self.iter().map(|r| r.attr))
    }

    pub fn lvl_values(&self) -> Vec<i64> {
        unique(self.iter().map(|r| r.lvl))
    }

    pub fn run_values(&self) -> Vec<i64> {
        unique(self.iter().map(|r| r.run))
    }

    pub fn est_values(&self) -> Vec<String> {
        unique(self.iter().map(|r| r.est.clone()))
    }

    pub fn attr_count(&self) -> usize {
        self.attr_values().len()
    }

    pub fn lvl_count(&self) -> usize {
        self.lvl_values().len()
    }

    pub fn run_count(&self) -> usize {
        self.run_values().len()
    }

    pub fn est_count(&self) -> usize {
        self.est_values().len()
    }

    /// Rows of one `(attr, lvl)` cell, optionally restricted to one estimator.
    pub fn rows_at(&self, attr: i64, lvl: i64, est: Option<&str>) -> Vec<&RawResultRow> {
        self.iter().filter(|r| r.matches(attr, lvl, est)).collect()
    }
}

fn unique<T: Ord>(values: impl Iterator<Item = T>) -> Vec<T> {
    values.collect::<BTreeSet<_>>().into_iter().collect()
}
