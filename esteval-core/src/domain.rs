//! Domain types shared by the crawl and the statistics engine.
//!
//! - `Metric` / `Metrics`: the four per-run error metrics an evaluator produces
//! - `RunKey` / `ConditionKey`: identity of one run and of one experimental condition
//! - `AlignmentType` / `AlignmentConfig`: how the external evaluator aligns trajectories

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State dimension used to normalize the mean of the ANEES metrics.
pub const STATE_DIMENSION: f64 = 3.0;

/// One of the four scalar error metrics of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Position ARMSE.
    ArmseP,
    /// Orientation ARMSE.
    ArmseQ,
    /// Position ANEES.
    AneesP,
    /// Orientation ANEES.
    AneesQ,
}

impl Metric {
    /// All metrics in column order.
    pub const ALL: [Metric; 4] = [Metric::ArmseP, Metric::ArmseQ, Metric::AneesP, Metric::AneesQ];

    /// Column name in result tables.
    pub fn column(self) -> &'static str {
        match self {
            Metric::ArmseP => "armse_p",
            Metric::ArmseQ => "armse_q",
            Metric::AneesP => "anees_p",
            Metric::AneesQ => "anees_q",
        }
    }

    /// Key used in the per-run checkpoint file.
    pub fn report_key(self) -> &'static str {
        match self {
            Metric::ArmseP => "ARMSE_p",
            Metric::ArmseQ => "ARMSE_q",
            Metric::AneesP => "ANEES_p",
            Metric::AneesQ => "ANEES_q",
        }
    }

    /// Consistency metrics are chi-square-like and scale with the state dimension.
    pub fn is_consistency(self) -> bool {
        matches!(self, Metric::AneesP | Metric::AneesQ)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// The four metrics of one run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub armse_p: f64,
    pub armse_q: f64,
    pub anees_p: f64,
    pub anees_q: f64,
}

impl Metrics {
    pub fn new(armse_p: f64, armse_q: f64, anees_p: f64, anees_q: f64) -> Self {
        Self {
            armse_p,
            armse_q,
            anees_p,
            anees_q,
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ArmseP => self.armse_p,
            Metric::ArmseQ => self.armse_q,
            Metric::AneesP => self.anees_p,
            Metric::AneesQ => self.anees_q,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::ArmseP => self.armse_p = value,
            Metric::ArmseQ => self.armse_q = value,
            Metric::AneesP => self.anees_p = value,
            Metric::AneesQ => self.anees_q = value,
        }
    }

    /// First metric that is negative or not finite, if any.
    pub fn first_invalid(&self) -> Option<Metric> {
        Metric::ALL
            .into_iter()
            .find(|m| !(self.get(*m).is_finite() && self.get(*m) >= 0.0))
    }
}

/// Whether `est` can be stored as an estimator id in a delimited table:
/// non-empty, without whitespace, field separators, comment markers or quotes.
pub fn is_valid_estimator_id(est: &str) -> bool {
    !est.is_empty()
        && !est
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '#' | '"' | '\''))
}

/// Identity of a single evaluation run: `(attr, lvl, run, est)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub attr: i64,
    pub lvl: i64,
    pub run: i64,
    pub est: String,
}

impl RunKey {
    pub fn condition(&self) -> ConditionKey {
        ConditionKey {
            attr: self.attr,
            lvl: self.lvl,
            est: self.est.clone(),
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attr={} lvl={} run={} est={}",
            self.attr, self.lvl, self.run, self.est
        )
    }
}

/// Grouping key of a condition: `(attr, lvl, est)`.
///
/// Ordering is attr, then lvl, then est, which is the order summary rows are emitted in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConditionKey {
    pub attr: i64,
    pub lvl: i64,
    pub est: String,
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attr={} lvl={} est={}", self.attr, self.lvl, self.est)
    }
}

/// Trajectory alignment applied by the external evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentType {
    None,
    #[default]
    Se3,
    Sim3,
    #[serde(alias = "pos+yaw")]
    PosYaw,
    Pos,
}

impl AlignmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlignmentType::None => "none",
            AlignmentType::Se3 => "se3",
            AlignmentType::Sim3 => "sim3",
            AlignmentType::PosYaw => "posyaw",
            AlignmentType::Pos => "pos",
        }
    }
}

impl fmt::Display for AlignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(AlignmentType::None),
            "se3" => Ok(AlignmentType::Se3),
            "sim3" => Ok(AlignmentType::Sim3),
            "posyaw" | "pos+yaw" | "pos_yaw" => Ok(AlignmentType::PosYaw),
            "pos" => Ok(AlignmentType::Pos),
            other => Err(format!(
                "unknown alignment type '{other}' (expected none, se3, sim3, posyaw, pos)"
            )),
        }
    }
}

/// Alignment settings handed to the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    pub alignment_type: AlignmentType,
    /// Number of samples used for alignment; `-1` aligns on all samples.
    pub sample_count: i64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            alignment_type: AlignmentType::Se3,
            sample_count: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_columns_in_schema_order() {
        let cols: Vec<_> = Metric::ALL.iter().map(|m| m.column()).collect();
        assert_eq!(cols, ["armse_p", "armse_q", "anees_p", "anees_q"]);
    }

    #[test]
    fn metrics_get_set() {
        let mut m = Metrics::default();
        m.set(Metric::AneesQ, 4.5);
        assert_eq!(m.get(Metric::AneesQ), 4.5);
        assert_eq!(m.anees_q, 4.5);
    }

    #[test]
    fn estimator_ids_must_be_table_safe() {
        assert!(is_valid_estimator_id("ekf"));
        assert!(is_valid_estimator_id("msckf_v2.1"));
        assert!(!is_valid_estimator_id(""));
        assert!(!is_valid_estimator_id("my filter"));
        assert!(!is_valid_estimator_id("v#2"));
        assert!(!is_valid_estimator_id("a,b"));
        assert!(!is_valid_estimator_id("\"q\""));
    }

    #[test]
    fn first_invalid_detects_nan_and_negative() {
        assert_eq!(Metrics::new(0.1, 0.2, 3.0, 3.0).first_invalid(), None);
        assert_eq!(
            Metrics::new(0.1, f64::NAN, 3.0, 3.0).first_invalid(),
            Some(Metric::ArmseQ)
        );
        assert_eq!(
            Metrics::new(0.1, 0.2, -1.0, 3.0).first_invalid(),
            Some(Metric::AneesP)
        );
    }

    #[test]
    fn alignment_type_parses_all_spellings() {
        assert_eq!("None".parse::<AlignmentType>(), Ok(AlignmentType::None));
        assert_eq!("se3".parse::<AlignmentType>(), Ok(AlignmentType::Se3));
        assert_eq!("SIM3".parse::<AlignmentType>(), Ok(AlignmentType::Sim3));
        assert_eq!("pos+yaw".parse::<AlignmentType>(), Ok(AlignmentType::PosYaw));
        assert_eq!("posyaw".parse::<AlignmentType>(), Ok(AlignmentType::PosYaw));
        assert_eq!("pos".parse::<AlignmentType>(), Ok(AlignmentType::Pos));
        assert!("affine".parse::<AlignmentType>().is_err());
    }

    #[test]
    fn condition_keys_order_attr_lvl_est() {
        let a = ConditionKey { attr: 1, lvl: 2, est: "B".into() };
        let b = ConditionKey { attr: 1, lvl: 10, est: "A".into() };
        let c = ConditionKey { attr: 2, lvl: 1, est: "A".into() };
        let mut keys = vec![c.clone(), b.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
    }
}
