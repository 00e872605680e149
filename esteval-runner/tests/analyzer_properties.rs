//! Property tests for outlier rejection and per-condition statistics.

use proptest::prelude::*;

use esteval_core::{Metric, Metrics, RawResultRow, RawResultsDataset, RunKey};
use esteval_runner::{
    analyze, normalize, reject_outliers, removal_count, Normalization,
};

// ── Strategies (proptest) ──

fn arb_metric_value() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.0), 0.0..100.0_f64]
}

fn arb_metrics() -> impl Strategy<Value = Metrics> {
    (
        arb_metric_value(),
        arb_metric_value(),
        arb_metric_value(),
        arb_metric_value(),
    )
        .prop_map(|(a, b, c, d)| Metrics::new(a, b, c, d))
}

fn arb_group() -> impl Strategy<Value = Vec<RawResultRow>> {
    prop::collection::vec(arb_metrics(), 1..60).prop_map(|metrics| {
        metrics
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                RawResultRow::new(
                    RunKey {
                        attr: 1,
                        lvl: 1,
                        run: i as i64 + 1,
                        est: "A".into(),
                    },
                    m,
                )
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn removes_a_tenth_or_one(rows in arb_group()) {
        let refs: Vec<&RawResultRow> = rows.iter().collect();
        let n = refs.len();
        let rejection = reject_outliers(&refs);
        let expected = if n / 10 >= 1 { n / 10 } else if n > 1 { 1 } else { 0 };
        prop_assert_eq!(rejection.removed.len(), expected);
        prop_assert_eq!(rejection.kept.len(), n - expected);
        prop_assert_eq!(removal_count(n), expected);
        prop_assert!(rejection.degenerate.is_none());
    }

    #[test]
    fn normalized_values_stay_in_unit_interval(rows in arb_group()) {
        let refs: Vec<&RawResultRow> = rows.iter().collect();
        let Normalization::Normalized(table) = normalize(&refs) else {
            return Err(TestCaseError::fail("non-negative finite group must normalize"));
        };
        for metric in Metric::ALL {
            let column: Vec<f64> = (0..table.len()).map(|i| table.value(i, metric)).collect();
            prop_assert!(column.iter().all(|v| (0.0..=1.0).contains(v)));
            let max = column.iter().copied().fold(0.0_f64, f64::max);
            let raw_max = refs.iter().map(|r| r.metrics.get(metric)).fold(0.0_f64, f64::max);
            if raw_max > 0.0 {
                prop_assert_eq!(max, 1.0);
            } else {
                prop_assert_eq!(max, 0.0);
            }
        }
    }

    #[test]
    fn kept_rows_never_score_above_removed_ones(rows in arb_group()) {
        let refs: Vec<&RawResultRow> = rows.iter().collect();
        let Normalization::Normalized(table) = normalize(&refs) else {
            return Err(TestCaseError::fail("non-negative finite group must normalize"));
        };
        let score = |row: &RawResultRow| table.composite((row.run - 1) as usize);
        let rejection = reject_outliers(&refs);
        for removed in &rejection.removed {
            for kept in &rejection.kept {
                prop_assert!(score(kept) <= score(removed));
            }
        }
    }

    #[test]
    fn summary_has_one_row_per_group_with_pairs_after_rejection(rows in arb_group(), split in 1usize..4) {
        // spread the runs over `split` estimators
        let rows: Vec<RawResultRow> = rows
            .into_iter()
            .map(|mut r| {
                r.est = format!("E{}", r.run as usize % split);
                r
            })
            .collect();
        let raw = RawResultsDataset::from_rows(rows).unwrap();
        let analysis = analyze(&raw, 1.0, 5.0);
        prop_assert_eq!(analysis.summary.len(), raw.est_count());
        for row in analysis.summary.iter() {
            let n = raw.rows_at(row.attr, row.lvl, Some(&row.est)).len();
            prop_assert_eq!(row.pairs(), n - removal_count(n));
            prop_assert_eq!(row.failure, row.armse_p.mean > 1.0 || row.armse_q.mean > 5.0);
            prop_assert!(row.armse_p.min <= row.armse_p.median && row.armse_p.median <= row.armse_p.max);
        }
    }
}
