//! EstEval Runner: tree crawl, checkpointed evaluation, outlier rejection, judgement.
//!
//! This crate builds on `esteval-core` to provide:
//! - Crawling of an `ATTR_*/LVL_*/RUN_*` evaluation tree into a raw results table
//! - Checkpoint reuse, with a pluggable evaluator for cache misses
//! - Per-condition outlier rejection and descriptive statistics
//! - Pass/fail judgement against position and orientation thresholds
//! - TOML configuration

pub mod analyzer;
pub mod config;
pub mod crawler;
pub mod evaluator;
pub mod outlier;

pub use analyzer::{
    analyze, average_all, average_over_runs, group_by_condition, Analysis, AveragedRun,
    DegenerateGroup, EvaluationAnalyzer, Thresholds,
};
pub use config::{ConfigError, EvalConfig, EvaluationConfig, JudgementConfig, LayoutConfig};
pub use crawler::{ArtifactFailure, CorpusCrawler, CrawlError, CrawlOutcome, CrawlSummary};
pub use evaluator::{
    CheckpointOnly, CommandEvaluator, EvaluationError, EvaluationRequest, RunEvaluator,
};
pub use outlier::{normalize, reject_outliers, removal_count, Normalization, Rejection};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn analysis_is_send_sync() {
        assert_send::<Analysis>();
        assert_sync::<Analysis>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<EvalConfig>();
        assert_sync::<EvalConfig>();
    }

    #[test]
    fn evaluators_are_send_sync() {
        assert_send::<CommandEvaluator>();
        assert_sync::<CommandEvaluator>();
        assert_send::<CheckpointOnly>();
        assert_sync::<CheckpointOnly>();
    }
}
