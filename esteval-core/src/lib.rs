//! EstEval Core: domain types, name templates, checkpoint codec, result tables.
//!
//! This crate holds everything that is pure data:
//! - Domain types (metrics, run and condition keys, alignment settings)
//! - Name templates for the `ATTR_*/LVL_*/RUN_*` evaluation tree
//! - The per-run checkpoint file (`report.ini`)
//! - Fixed-schema tables for raw results and judged summaries
//! - Descriptive statistics of one metric

pub mod dataset;
pub mod domain;
pub mod report;
pub mod stats;
pub mod template;

pub use dataset::{
    Dataset, DatasetError, RawResultRow, RawResultsDataset, SaveOptions, SummaryDataset,
    SummaryRow, TableRow,
};
pub use domain::{
    is_valid_estimator_id, AlignmentConfig, AlignmentType, ConditionKey, Metric, Metrics, RunKey,
    STATE_DIMENSION,
};
pub use report::{EvaluationReport, ReportError};
pub use stats::Statistics;
pub use template::{ParameterPath, PathTemplate, TemplateError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the table and report types can cross threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<RawResultsDataset>();
        require_sync::<RawResultsDataset>();
        require_send::<SummaryDataset>();
        require_sync::<SummaryDataset>();
        require_send::<EvaluationReport>();
        require_sync::<EvaluationReport>();
        require_send::<PathTemplate>();
        require_sync::<PathTemplate>();
    }
}
