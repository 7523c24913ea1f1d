//! Batch schema.
//!
//! A [`RawBatch`] mirrors the key/value batch produced by the data pipeline
//! and deserializes directly from JSON. It is converted once into a
//! validated [`Batch`], after which all shapes are known to be consistent.

use std::convert::TryFrom;

use mf_layers::FeatureBag;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// A batch as it arrives from the data pipeline. Every key is optional here
/// so that a missing required key is reported as such.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBatch {
    /// User ids `[B]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_idx: Option<Vec<i64>>,
    /// Positive item ids `[B]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_idx: Option<Vec<i64>>,
    /// User feature hashes `[B, F_u]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feature_hashes: Option<Vec<Vec<i64>>>,
    /// User feature weights `[B, F_u]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feature_weights: Option<Vec<Vec<f32>>>,
    /// Item feature hashes `[B, F_i]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_feature_hashes: Option<Vec<Vec<i64>>>,
    /// Item feature weights `[B, F_i]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_feature_weights: Option<Vec<Vec<f32>>>,
    /// Labels `[B]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Vec<f32>>,
    /// Sample weights `[B]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Vec<f32>>,
    /// Negative item ids `[B, N]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neg_item_idx: Option<Vec<Vec<i64>>>,
    /// Negative item feature hashes `[B, N, F_n]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neg_item_feature_hashes: Option<Vec<Vec<Vec<i64>>>>,
    /// Negative item feature weights `[B, N, F_n]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neg_item_feature_weights: Option<Vec<Vec<Vec<f32>>>>,
}

impl RawBatch {
    /// Parses a batch from a JSON object.
    pub fn from_json(json: &str) -> DataResult<Self> {
        serde_json::from_str(json).map_err(|source| DataError::Json { line: 1, source })
    }
}

/// Sampled negatives of a batch, flattened entity-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NegativeItems {
    /// Negative item ids `[B * N]`
    pub item_idx: Vec<i64>,
    /// Negative item features, one row per negative `[B * N, F_n]`
    pub features: FeatureBag,
    /// Negatives per entity (`N`)
    pub neg_multiple: usize,
}

/// A validated batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// User ids `[B]`
    pub user_idx: Vec<i64>,
    /// Positive item ids `[B]`
    pub item_idx: Vec<i64>,
    /// User features `[B, F_u]`
    pub user_features: FeatureBag,
    /// Positive item features `[B, F_i]`
    pub item_features: FeatureBag,
    /// Labels `[B]`
    pub label: Vec<f32>,
    /// Sample weights `[B]`
    pub weight: Vec<f32>,
    /// Sampled negatives, if the batch carries them
    pub negatives: Option<NegativeItems>,
}

impl Batch {
    /// Number of examples (`B`).
    pub fn batch_size(&self) -> usize {
        self.user_idx.len()
    }

    /// Negatives per example (`N`), zero without negatives.
    pub fn neg_multiple(&self) -> usize {
        self.negatives.as_ref().map(|n| n.neg_multiple).unwrap_or(0)
    }

    /// Parses and validates a batch from a JSON object.
    pub fn from_json(json: &str) -> DataResult<Self> {
        Batch::try_from(RawBatch::from_json(json)?)
    }
}

fn required<T>(value: Option<T>, name: &'static str) -> DataResult<T> {
    value.ok_or(DataError::MissingField(name))
}

fn check_len(name: &str, expected: usize, actual: usize) -> DataResult<()> {
    if expected != actual {
        return Err(DataError::Schema(format!(
            "{name} has {actual} rows, expected {expected}"
        )));
    }
    Ok(())
}

/// Checks that `rows` is rectangular and returns its column count.
fn rectangular<T>(name: &str, rows: &[Vec<T>]) -> DataResult<usize> {
    let cols = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(i) = rows.iter().position(|r| r.len() != cols) {
        return Err(DataError::Schema(format!(
            "{name} row {i} has {} entries, expected {cols}",
            rows[i].len()
        )));
    }
    Ok(cols)
}

fn feature_bag(
    name: &str,
    batch_size: usize,
    hashes: &[Vec<i64>],
    weights: Option<&[Vec<f32>]>,
) -> DataResult<FeatureBag> {
    check_len(name, batch_size, hashes.len())?;
    let cols = rectangular(name, hashes)?;
    if let Some(weights) = weights {
        check_len(name, batch_size, weights.len())?;
        let weight_cols = rectangular(name, weights)?;
        if weight_cols != cols {
            return Err(DataError::Schema(format!(
                "{name} weights have {weight_cols} features, hashes have {cols}"
            )));
        }
    }
    Ok(FeatureBag::from_rows(hashes, weights)?)
}

fn negatives(
    batch_size: usize,
    idx: Vec<Vec<i64>>,
    hashes: Vec<Vec<Vec<i64>>>,
    weights: Vec<Vec<Vec<f32>>>,
) -> DataResult<NegativeItems> {
    check_len("neg_item_idx", batch_size, idx.len())?;
    let neg_multiple = rectangular("neg_item_idx", &idx)?;
    check_len("neg_item_feature_hashes", batch_size, hashes.len())?;
    check_len("neg_item_feature_weights", batch_size, weights.len())?;
    for (i, (h, w)) in hashes.iter().zip(&weights).enumerate() {
        if h.len() != neg_multiple || w.len() != neg_multiple {
            return Err(DataError::Schema(format!(
                "negatives of example {i} disagree on neg_multiple: ids {neg_multiple}, hashes {}, weights {}",
                h.len(),
                w.len()
            )));
        }
    }
    let flat_hashes: Vec<Vec<i64>> = hashes.into_iter().flatten().collect();
    let flat_weights: Vec<Vec<f32>> = weights.into_iter().flatten().collect();
    let features = feature_bag(
        "neg_item_feature_hashes",
        batch_size * neg_multiple,
        &flat_hashes,
        Some(flat_weights.as_slice()),
    )?;
    Ok(NegativeItems {
        item_idx: idx.into_iter().flatten().collect(),
        features,
        neg_multiple,
    })
}

impl TryFrom<RawBatch> for Batch {
    type Error = DataError;

    fn try_from(raw: RawBatch) -> DataResult<Self> {
        let user_idx = required(raw.user_idx, "user_idx")?;
        let item_idx = required(raw.item_idx, "item_idx")?;
        let user_hashes = required(raw.user_feature_hashes, "user_feature_hashes")?;
        let item_hashes = required(raw.item_feature_hashes, "item_feature_hashes")?;
        let label = required(raw.label, "label")?;
        let weight = required(raw.weight, "weight")?;

        let batch_size = user_idx.len();
        if batch_size == 0 {
            return Err(DataError::Schema("batch has no examples".to_string()));
        }
        check_len("item_idx", batch_size, item_idx.len())?;
        check_len("label", batch_size, label.len())?;
        check_len("weight", batch_size, weight.len())?;

        let user_features = feature_bag(
            "user_feature_hashes",
            batch_size,
            &user_hashes,
            raw.user_feature_weights.as_deref(),
        )?;
        let item_features = feature_bag(
            "item_feature_hashes",
            batch_size,
            &item_hashes,
            raw.item_feature_weights.as_deref(),
        )?;

        let negatives = match (
            raw.neg_item_idx,
            raw.neg_item_feature_hashes,
            raw.neg_item_feature_weights,
        ) {
            (None, None, None) => None,
            (Some(idx), Some(hashes), Some(weights)) => {
                Some(negatives(batch_size, idx, hashes, weights)?)
            }
            (idx, hashes, weights) => {
                let missing: Vec<&str> = [
                    ("neg_item_idx", idx.is_none()),
                    ("neg_item_feature_hashes", hashes.is_none()),
                    ("neg_item_feature_weights", weights.is_none()),
                ]
                .into_iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| name)
                .collect();
                return Err(DataError::Schema(format!(
                    "negative item keys must be given together, missing {}",
                    missing.join(", ")
                )));
            }
        };

        Ok(Self {
            user_idx,
            item_idx,
            user_features,
            item_features,
            label,
            weight,
            negatives,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawBatch {
        RawBatch {
            user_idx: Some(vec![1, 2]),
            item_idx: Some(vec![10, 20]),
            user_feature_hashes: Some(vec![vec![0, 1], vec![2, 3]]),
            user_feature_weights: None,
            item_feature_hashes: Some(vec![vec![4], vec![5]]),
            item_feature_weights: Some(vec![vec![0.5], vec![1.0]]),
            label: Some(vec![1.0, 1.0]),
            weight: Some(vec![1.0, 2.0]),
            ..Default::default()
        }
    }

    fn with_negatives(mut raw: RawBatch) -> RawBatch {
        raw.neg_item_idx = Some(vec![vec![30, 31], vec![32, 33]]);
        raw.neg_item_feature_hashes = Some(vec![vec![vec![6], vec![7]], vec![vec![8], vec![9]]]);
        raw.neg_item_feature_weights =
            Some(vec![vec![vec![1.0], vec![1.0]], vec![vec![1.0], vec![0.5]]]);
        raw
    }

    #[test]
    fn test_valid_batch_without_negatives() {
        let batch = Batch::try_from(raw()).unwrap();
        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.neg_multiple(), 0);
        assert_eq!(batch.user_features.num_features(), 2);
        assert_eq!(batch.user_features.weight(1, 1), 1.0);
        assert_eq!(batch.item_features.weight(0, 0), 0.5);
    }

    #[test]
    fn test_negatives_flatten_entity_major() {
        let batch = Batch::try_from(with_negatives(raw())).unwrap();
        let negatives = batch.negatives.unwrap();
        assert_eq!(negatives.neg_multiple, 2);
        assert_eq!(negatives.item_idx, vec![30, 31, 32, 33]);
        assert_eq!(negatives.features.hashes(), &[6, 7, 8, 9]);
        assert_eq!(negatives.features.weight(3, 0), 0.5);
    }

    #[test]
    fn test_missing_required_field() {
        let mut raw = raw();
        raw.label = None;
        assert!(matches!(
            Batch::try_from(raw),
            Err(DataError::MissingField("label"))
        ));
    }

    #[test]
    fn test_partial_negative_keys() {
        let mut raw = with_negatives(raw());
        raw.neg_item_feature_weights = None;
        let err = Batch::try_from(raw).unwrap_err();
        assert!(matches!(err, DataError::Schema(_)));
        assert!(err.to_string().contains("neg_item_feature_weights"));
    }

    #[test]
    fn test_length_mismatches() {
        let mut short_weight = raw();
        short_weight.weight = Some(vec![1.0]);
        assert!(matches!(Batch::try_from(short_weight), Err(DataError::Schema(_))));

        let mut ragged = raw();
        ragged.user_feature_hashes = Some(vec![vec![0, 1], vec![2]]);
        assert!(matches!(Batch::try_from(ragged), Err(DataError::Schema(_))));

        let mut mismatched_weights = raw();
        mismatched_weights.item_feature_weights = Some(vec![vec![0.5, 0.5], vec![1.0, 1.0]]);
        assert!(matches!(
            Batch::try_from(mismatched_weights),
            Err(DataError::Schema(_))
        ));

        let mut bad_multiple = with_negatives(raw());
        bad_multiple.neg_item_feature_hashes = Some(vec![vec![vec![6]], vec![vec![8]]]);
        assert!(matches!(Batch::try_from(bad_multiple), Err(DataError::Schema(_))));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let raw = RawBatch {
            user_idx: Some(vec![]),
            item_idx: Some(vec![]),
            user_feature_hashes: Some(vec![]),
            item_feature_hashes: Some(vec![]),
            label: Some(vec![]),
            weight: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(Batch::try_from(raw), Err(DataError::Schema(_))));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "user_idx": [1], "item_idx": [2],
            "user_feature_hashes": [[0, 3]], "item_feature_hashes": [[5]],
            "label": [1.0], "weight": [1.0]
        }"#;
        let batch = Batch::from_json(json).unwrap();
        assert_eq!(batch.user_features.hashes(), &[0, 3]);

        let unknown = r#"{"user_idx": [1], "user_age": [30]}"#;
        assert!(matches!(Batch::from_json(unknown), Err(DataError::Json { .. })));
    }
}
