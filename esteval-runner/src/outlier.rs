//! Per-condition outlier rejection.
//!
//! Each metric column is divided by its maximum within the group, the four
//! normalized values of a run are summed into a composite score, and the
//! highest-scoring runs are dropped one at a time. The normalization baseline
//! is fixed before the first removal.

use esteval_core::{Metric, RawResultRow};

/// Number of runs removed from a group of `n`: a tenth, at least one unless
/// the group is a single run.
pub fn removal_count(n: usize) -> usize {
    if n / 10 >= 1 {
        n / 10
    } else if n > 1 {
        1
    } else {
        0
    }
}

/// Max-normalized metrics of one group, row order preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedGroup {
    values: Vec<[f64; 4]>,
}

impl NormalizedGroup {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Normalized value of `metric` for row `i`, in `[0, 1]`.
    pub fn value(&self, i: usize, metric: Metric) -> f64 {
        let col = Metric::ALL.iter().position(|m| *m == metric).unwrap_or(0);
        self.values[i][col]
    }

    /// Sum of the four normalized values of row `i`, in `[0, 4]`.
    pub fn composite(&self, i: usize) -> f64 {
        self.values[i].iter().sum()
    }
}

/// Result of normalizing a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalization {
    Normalized(NormalizedGroup),
    /// `metric` holds a negative or non-finite value; the group cannot be scaled.
    Degenerate(Metric),
}

/// Divide every metric by its group maximum. An all-zero column normalizes to zero.
pub fn normalize(rows: &[&RawResultRow]) -> Normalization {
    let mut values = vec![[0.0; 4]; rows.len()];
    for (col, metric) in Metric::ALL.iter().enumerate() {
        let column: Vec<f64> = rows.iter().map(|r| r.metrics.get(*metric)).collect();
        if column.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Normalization::Degenerate(*metric);
        }
        let max = column.iter().copied().fold(0.0_f64, f64::max);
        if max == 0.0 {
            continue;
        }
        for (row, v) in values.iter_mut().zip(&column) {
            row[col] = v / max;
        }
    }
    Normalization::Normalized(NormalizedGroup { values })
}

/// Rows kept and removed by [`reject_outliers`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection<'a> {
    /// Surviving rows in group order.
    pub kept: Vec<&'a RawResultRow>,
    /// Removed rows in removal order.
    pub removed: Vec<&'a RawResultRow>,
    /// Set when normalization failed and nothing was removed.
    pub degenerate: Option<Metric>,
}

/// Drop the [`removal_count`] highest composite scores from one group.
///
/// Ties go to the earliest row. A degenerate group is returned unfiltered.
pub fn reject_outliers<'a>(rows: &[&'a RawResultRow]) -> Rejection<'a> {
    let table = match normalize(rows) {
        Normalization::Normalized(table) => table,
        Normalization::Degenerate(metric) => {
            return Rejection {
                kept: rows.to_vec(),
                removed: Vec::new(),
                degenerate: Some(metric),
            }
        }
    };

    let mut alive: Vec<usize> = (0..rows.len()).collect();
    let mut removed = Vec::new();
    for _ in 0..removal_count(rows.len()) {
        let mut worst: Option<(usize, f64)> = None;
        for (pos, &i) in alive.iter().enumerate() {
            let score = table.composite(i);
            if worst.map_or(true, |(_, best)| score > best) {
                worst = Some((pos, score));
            }
        }
        let Some((pos, _)) = worst else { break };
        removed.push(rows[alive.remove(pos)]);
    }

    Rejection {
        kept: alive.into_iter().map(|i| rows[i]).collect(),
        removed,
        degenerate: None,
    }
}
