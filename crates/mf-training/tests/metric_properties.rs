//! Range and ordering invariants of the retrieval metrics.

use mf_training::{EmptyTargetAction, RankingMetricSink, RetrievalMetrics, RETRIEVAL_METRICS};
use proptest::prelude::*;

fn rows() -> impl Strategy<Value = Vec<(f32, f32, i64)>> {
    let grade = prop::sample::select(vec![0.0f32, 1.0, 2.0]);
    prop::collection::vec((-5.0f32..5.0, grade, 0i64..4), 1..40)
}

fn compute(rows: &[(f32, f32, i64)], top_k: usize, action: EmptyTargetAction) -> Vec<f32> {
    let preds: Vec<f32> = rows.iter().map(|r| r.0).collect();
    let target: Vec<f32> = rows.iter().map(|r| r.1).collect();
    let indexes: Vec<i64> = rows.iter().map(|r| r.2).collect();
    let mut metrics = RetrievalMetrics::new("val", top_k).with_empty_target_action(action);
    metrics.update(&preds, &target, &indexes).unwrap();
    let values = metrics.compute();
    RETRIEVAL_METRICS
        .iter()
        .map(|name| values[&format!("val/{name}")])
        .collect()
}

proptest! {
    /// Every metric lies in [0, 1] whatever the scores, grades and cutoff.
    #[test]
    fn metrics_stay_in_unit_interval(rows in rows(), top_k in 1usize..10) {
        for action in [EmptyTargetAction::Neg, EmptyTargetAction::Pos, EmptyTargetAction::Skip] {
            for value in compute(&rows, top_k, action) {
                prop_assert!((0.0..=1.0 + 1e-6).contains(&value), "{:?}: {}", action, value);
            }
        }
    }

    /// Counting empty queries as misses never reports more than skipping them.
    #[test]
    fn empty_queries_only_lower_the_mean(rows in rows(), top_k in 1usize..10) {
        let neg = compute(&rows, top_k, EmptyTargetAction::Neg);
        let skip = compute(&rows, top_k, EmptyTargetAction::Skip);
        for (n, s) in neg.iter().zip(&skip) {
            prop_assert!(n <= &(s + 1e-6));
        }
    }
}
