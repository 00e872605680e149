//! EstEval CLI: crawl an evaluation tree, aggregate runs, judge estimators.
//!
//! Writes `eval.csv` (one row per run) and `eval_analyzed.csv` (one row per
//! `(attr, lvl, est)` condition) into the evaluation root.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};

use esteval_core::{AlignmentType, Metric, RawResultsDataset, SaveOptions, SummaryRow};
use esteval_runner::{Analysis, CorpusCrawler, EvalConfig, EvaluationAnalyzer, Thresholds};

#[derive(Parser)]
#[command(
    name = "esteval",
    about = "EstEval CLI: batch evaluation of state estimators over an ATTR/LVL/RUN tree"
)]
struct Cli {
    /// Root of the evaluation tree.
    #[arg(long = "eval_dir")]
    eval_dir: PathBuf,

    /// Failure thresholds: mean position ARMSE [m] and mean orientation ARMSE [deg].
    #[arg(long, num_args = 2, value_names = ["POS", "ORI"], required = true)]
    thresholds: Vec<f64>,

    /// Ignore existing checkpoints and evaluate every artifact again.
    #[arg(long, default_value_t = false)]
    redo: bool,

    /// Ask the evaluator to show plots.
    #[arg(long, default_value_t = false)]
    plot: bool,

    /// Ask the evaluator to save plots next to the checkpoint.
    #[arg(long = "save_plot", default_value_t = false)]
    save_plot: bool,

    /// Trajectory alignment: none, se3, sim3, posyaw, pos.
    #[arg(long = "alignment_type")]
    alignment_type: Option<AlignmentType>,

    /// Samples used for alignment, -1 for all.
    #[arg(long, allow_negative_numbers = true)]
    frames: Option<i64>,

    /// TOML config file (layout, evaluator commands).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the summary as `eval_analyzed.json`.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Debug-level logging.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let started = Instant::now();
    let (config, thresholds) = build_config(&cli)?;
    let analysis = run(&cli.eval_dir, &config, thresholds, cli.redo, cli.json)?;

    for row in analysis.summary.iter() {
        let degenerate = analysis
            .degenerate
            .iter()
            .find(|d| d.key == row.condition())
            .map(|d| d.metric);
        println!("{}", report_line(row, degenerate));
    }
    let failing = analysis.failures().len();
    println!(
        "{} conditions, {} failing (thresholds: {} m, {} deg)",
        analysis.summary.len(),
        failing,
        thresholds.position,
        thresholds.orientation
    );
    println!(
        "evaluation finished after [{:.3} sec]",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Config file (or defaults) with CLI flags applied on top.
fn build_config(cli: &Cli) -> Result<(EvalConfig, Thresholds)> {
    let mut config = match &cli.config {
        Some(path) => EvalConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EvalConfig::default(),
    };

    let evaluation = &mut config.evaluation;
    if let Some(alignment) = cli.alignment_type {
        evaluation.alignment = alignment;
    }
    if let Some(frames) = cli.frames {
        evaluation.frames = frames;
    }
    evaluation.plot |= cli.plot;
    evaluation.save_plot |= cli.save_plot;

    let [position, orientation] = cli.thresholds.as_slice() else {
        bail!("--thresholds takes exactly two values: POS ORI");
    };
    config.judgement.position = Some(*position);
    config.judgement.orientation = Some(*orientation);
    config.validate().context("invalid configuration")?;

    let Some(thresholds) = config.thresholds() else {
        bail!("--thresholds takes exactly two values: POS ORI");
    };
    Ok((config, thresholds))
}

fn run(
    eval_dir: &Path,
    config: &EvalConfig,
    thresholds: Thresholds,
    redo: bool,
    json: bool,
) -> Result<Analysis> {
    if !eval_dir.is_dir() {
        bail!("evaluation directory {} does not exist", eval_dir.display());
    }
    log::info!(
        "alignment={} frames={} redo={}",
        config.evaluation.alignment,
        config.evaluation.frames,
        redo
    );

    let evaluator = config.evaluation.evaluator();
    let crawler = CorpusCrawler::new(
        config.layout.clone(),
        config.evaluation.clone(),
        evaluator.as_ref(),
    )?;
    let outcome = crawler.run(eval_dir, redo)?;
    if outcome.dataset.is_empty() {
        bail!(
            "no results under {}: {} artifacts found, {} failed",
            eval_dir.display(),
            outcome.summary.artifacts,
            outcome.summary.failures.len()
        );
    }

    let raw_path = eval_dir.join(&config.layout.raw_results_file);
    outcome
        .dataset
        .save(&raw_path, SaveOptions::default())
        .with_context(|| format!("failed to save {}", raw_path.display()))?;
    log::info!("saved {} rows to {}", outcome.dataset.len(), raw_path.display());

    let raw = RawResultsDataset::load(&raw_path)
        .with_context(|| format!("failed to reload {}", raw_path.display()))?;
    let analysis = EvaluationAnalyzer::new(thresholds).analyze(&raw);

    let summary_path = eval_dir.join(&config.layout.summary_file);
    analysis
        .summary
        .save(&summary_path, SaveOptions::with_index())
        .with_context(|| format!("failed to save {}", summary_path.display()))?;
    log::info!("saved summary to {}", summary_path.display());

    if json {
        let json_path = summary_path.with_extension("json");
        let text = analysis.summary.to_json()?;
        std::fs::write(&json_path, text)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
        log::info!("saved JSON summary to {}", json_path.display());
    }

    Ok(analysis)
}

/// One console line per condition; degenerate groups are marked since their
/// statistics include every run.
fn report_line(row: &SummaryRow, degenerate: Option<Metric>) -> String {
    let mut line = format!(
        "ATTR {} LVL {} EST {}: pairs={} ARMSE_p={:.4} ARMSE_q={:.4} ANEES_p={:.3} ANEES_q={:.3} -> {}",
        row.attr,
        row.lvl,
        row.est,
        row.pairs(),
        row.armse_p.mean,
        row.armse_q.mean,
        row.anees_p.mean,
        row.anees_q.mean,
        if row.failure { "FAIL" } else { "PASS" }
    );
    if let Some(metric) = degenerate {
        line.push_str(&format!(" [degenerate: {metric}, no outlier rejection]"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use esteval_core::Statistics;

    fn summary_row(failure: bool) -> SummaryRow {
        let stats = Statistics::from_values(&[0.1, 0.2]);
        SummaryRow {
            attr: 1,
            lvl: 2,
            est: "ekf".into(),
            armse_p: stats,
            armse_q: stats,
            anees_p: stats,
            anees_q: stats,
            failure,
        }
    }

    #[test]
    fn report_line_marks_degenerate_groups() {
        let plain = report_line(&summary_row(false), None);
        assert!(plain.starts_with("ATTR 1 LVL 2 EST ekf: pairs=2"));
        assert!(plain.ends_with("-> PASS"));

        let marked = report_line(&summary_row(true), Some(Metric::ArmseP));
        assert!(marked.contains("-> FAIL [degenerate: "));
        assert!(marked.ends_with("no outlier rejection]"));
    }
}
