//! Descriptive statistics of one metric over a set of runs.

use serde::{Deserialize, Serialize};

/// Column suffixes of a [`Statistics`] block, in file order.
pub const STAT_FIELDS: [&str; 8] = ["max", "min", "pairs", "var", "rmse", "median", "mean", "std"];

/// Summary of one metric over the runs of a condition.
///
/// Variance and standard deviation are population statistics (divide by `n`).
/// `rmse` is the root of the mean of squares, not the mean itself.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub max: f64,
    pub min: f64,
    /// Number of contributing values.
    pub pairs: usize,
    pub var: f64,
    pub rmse: f64,
    pub median: f64,
    pub mean: f64,
    pub std: f64,
}

impl Statistics {
    /// Compute statistics over `values`. An empty slice yields all zeros.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let rmse = (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);

        Self {
            max,
            min,
            pairs: values.len(),
            var,
            rmse,
            median: median(values),
            mean,
            std: var.sqrt(),
        }
    }

    /// Values in [`STAT_FIELDS`] order, `pairs` widened to `f64`.
    pub fn as_array(&self) -> [f64; 8] {
        [
            self.max,
            self.min,
            self.pairs as f64,
            self.var,
            self.rmse,
            self.median,
            self.mean,
            self.std,
        ]
    }
}

/// Median with the midpoint convention for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
