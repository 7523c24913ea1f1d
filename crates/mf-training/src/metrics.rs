//! Retrieval metrics and loss averaging.
//!
//! [`RetrievalMetrics`] consumes `(score, label, user_idx)` triples, groups
//! them into one ranked list per user and reports, at a cutoff `top_k`:
//!
//! | key suffix | per-query value |
//! |------------|-----------------|
//! | `RetrievalNormalizedDCG` | DCG of the top k over the ideal DCG, graded by label |
//! | `RetrievalRecall` | relevant items in the top k over all relevant items |
//! | `RetrievalPrecision` | relevant items in the top k over k |
//! | `RetrievalMAP` | mean precision at each relevant position in the top k |
//! | `RetrievalHitRate` | 1 if any relevant item is in the top k |
//! | `RetrievalMRR` | reciprocal rank of the first relevant item in the top k |
//!
//! An item is relevant when its label is positive. The reported value is the
//! mean over queries. A query without any relevant item counts as 0 by
//! default; [`EmptyTargetAction`] changes that.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{TrainingError, TrainingResult};

/// Metric names, in reporting order.
pub const RETRIEVAL_METRICS: [&str; 6] = [
    "RetrievalNormalizedDCG",
    "RetrievalRecall",
    "RetrievalPrecision",
    "RetrievalMAP",
    "RetrievalHitRate",
    "RetrievalMRR",
];

/// What a query without any relevant item contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTargetAction {
    /// Every metric is 0 for the query.
    #[default]
    Neg,
    /// Every metric is 1 for the query.
    Pos,
    /// The query is left out of the mean.
    Skip,
}

/// Consumer of aligned score, label and query id columns.
pub trait RankingMetricSink {
    /// Adds one batch of predictions. All slices are aligned row for row.
    fn update(&mut self, preds: &[f32], target: &[f32], indexes: &[i64]) -> TrainingResult<()>;

    /// Current metric values, keyed `"{prefix}/{name}"`.
    fn compute(&self) -> BTreeMap<String, f32>;

    /// Clears all accumulated state.
    fn reset(&mut self);
}

/// Ranking metrics grouped by query (user) id.
///
/// # Example
///
/// ```
/// use mf_training::metrics::{RankingMetricSink, RetrievalMetrics};
///
/// let mut metrics = RetrievalMetrics::new("val", 2);
/// metrics
///     .update(&[0.9, 0.1, 0.5], &[1.0, 0.0, 0.0], &[7, 7, 7])
///     .unwrap();
/// let values = metrics.compute();
/// assert_eq!(values["val/RetrievalHitRate"], 1.0);
/// assert_eq!(values["val/RetrievalPrecision"], 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct RetrievalMetrics {
    prefix: String,
    top_k: usize,
    empty_target_action: EmptyTargetAction,
    queries: HashMap<i64, Vec<(f32, f32)>>,
}

impl RetrievalMetrics {
    /// Creates metrics reported under `prefix` with cutoff `top_k`.
    pub fn new(prefix: impl Into<String>, top_k: usize) -> Self {
        Self {
            prefix: prefix.into(),
            top_k,
            empty_target_action: EmptyTargetAction::default(),
            queries: HashMap::new(),
        }
    }

    /// Sets how queries without a relevant item are counted.
    pub fn with_empty_target_action(mut self, action: EmptyTargetAction) -> Self {
        self.empty_target_action = action;
        self
    }

    /// The cutoff.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Number of distinct queries seen.
    pub fn num_queries(&self) -> usize {
        self.queries.len()
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

/// Per-query values in the order of [`RETRIEVAL_METRICS`], or `None` when
/// the query has no relevant item.
fn query_metrics(items: &[(f32, f32)], top_k: usize) -> Option<[f64; 6]> {
    let num_relevant = items.iter().filter(|(_, t)| *t > 0.0).count();
    if num_relevant == 0 {
        return None;
    }

    let mut ranked: Vec<(f32, f32)> = items.to_vec();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    let top = &ranked[..top_k.min(ranked.len())];

    let discount = |rank: usize| 1.0 / ((rank + 2) as f64).log2();
    let gain = |t: f32| f64::from(t.max(0.0));
    let dcg: f64 = top
        .iter()
        .enumerate()
        .map(|(rank, (_, t))| gain(*t) * discount(rank))
        .sum();
    let mut ideal: Vec<f32> = items.iter().map(|(_, t)| *t).collect();
    ideal.sort_by(|a, b| b.total_cmp(a));
    let idcg: f64 = ideal
        .iter()
        .take(top_k)
        .enumerate()
        .map(|(rank, t)| gain(*t) * discount(rank))
        .sum();
    let ndcg = if idcg > 0.0 { dcg / idcg } else { 0.0 };

    let mut hits = 0usize;
    let mut precision_sum = 0.0;
    let mut first_hit = None;
    for (rank, (_, t)) in top.iter().enumerate() {
        if *t > 0.0 {
            hits += 1;
            precision_sum += hits as f64 / (rank + 1) as f64;
            first_hit.get_or_insert(rank);
        }
    }

    let recall = hits as f64 / num_relevant as f64;
    let precision = hits as f64 / top_k as f64;
    let average_precision = if hits > 0 {
        precision_sum / hits as f64
    } else {
        0.0
    };
    let hit_rate = if hits > 0 { 1.0 } else { 0.0 };
    let reciprocal_rank = first_hit.map_or(0.0, |rank| 1.0 / (rank + 1) as f64);

    Some([
        ndcg,
        recall,
        precision,
        average_precision,
        hit_rate,
        reciprocal_rank,
    ])
}

impl RankingMetricSink for RetrievalMetrics {
    fn update(&mut self, preds: &[f32], target: &[f32], indexes: &[i64]) -> TrainingResult<()> {
        if preds.len() != target.len() || preds.len() != indexes.len() {
            return Err(TrainingError::Metric(format!(
                "metric inputs must align: {} preds, {} targets, {} indexes",
                preds.len(),
                target.len(),
                indexes.len()
            )));
        }
        for ((&p, &t), &q) in preds.iter().zip(target).zip(indexes) {
            self.queries.entry(q).or_default().push((p, t));
        }
        Ok(())
    }

    fn compute(&self) -> BTreeMap<String, f32> {
        let mut sums = [0.0f64; 6];
        let mut counted = 0usize;
        for items in self.queries.values() {
            let values = match query_metrics(items, self.top_k) {
                Some(values) => values,
                None => match self.empty_target_action {
                    EmptyTargetAction::Neg => [0.0; 6],
                    EmptyTargetAction::Pos => [1.0; 6],
                    EmptyTargetAction::Skip => continue,
                },
            };
            for (sum, v) in sums.iter_mut().zip(values) {
                *sum += v;
            }
            counted += 1;
        }
        RETRIEVAL_METRICS
            .iter()
            .zip(sums)
            .map(|(name, sum)| {
                let mean = if counted > 0 { sum / counted as f64 } else { 0.0 };
                (self.key(name), mean as f32)
            })
            .collect()
    }

    fn reset(&mut self) {
        self.queries.clear();
    }
}

/// Running averages of per-step loss maps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LossRecorder {
    sums: BTreeMap<String, f64>,
    steps: u64,
}

impl LossRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one step.
    pub fn record(&mut self, losses: &BTreeMap<String, f32>) {
        for (name, value) in losses {
            *self.sums.entry(name.clone()).or_insert(0.0) += f64::from(*value);
        }
        self.steps += 1;
    }

    /// Number of recorded steps.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Mean of every loss over the recorded steps.
    pub fn averages(&self) -> BTreeMap<String, f32> {
        if self.steps == 0 {
            return BTreeMap::new();
        }
        self.sums
            .iter()
            .map(|(name, sum)| (name.clone(), (sum / self.steps as f64) as f32))
            .collect()
    }

    /// Clears the recorder.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
