//! Negative-item augmentation of the item side of a batch.
//!
//! Sampled negatives are appended after the positives so that row `i < B` of
//! the augmented item tensor is still the positive of user `i`. Negatives are
//! flattened entity-major: the `k`-th negative of entity `i` lands at row
//! `B + i * N + k`. Losses rely on this layout together with `item_idx` to
//! exclude a user's own positive from its negative pool.

use crate::error::{LayerError, LayerResult};
use crate::tensor::Tensor;

/// Sampled negatives for one batch.
#[derive(Debug, Clone, Copy)]
pub struct NegativeSamples<'a> {
    /// Negative embeddings, `[B, N, D]` or already flattened `[B * N, D]`
    pub embed: &'a Tensor,
    /// Negative item ids, flattened `[B * N]`
    pub item_idx: &'a [i64],
    /// Number of negatives per entity
    pub neg_multiple: usize,
}

/// Item-side tensors after augmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedItems {
    /// Item embeddings `[B * (1 + N), D]`
    pub embed: Tensor,
    /// Item ids `[B * (1 + N)]`
    pub item_idx: Vec<i64>,
    /// Number of positive rows (`B`)
    pub num_positives: usize,
    /// Negatives per entity (`N`)
    pub neg_multiple: usize,
}

impl AugmentedItems {
    /// Total number of item rows.
    pub fn len(&self) -> usize {
        self.item_idx.len()
    }

    /// Returns true if there are no item rows.
    pub fn is_empty(&self) -> bool {
        self.item_idx.is_empty()
    }

    /// Splits a `[B * (1 + N), D]` gradient into the positive `[B, D]` and
    /// negative `[B * N, D]` parts.
    pub fn split_gradient(&self, grad: &Tensor) -> LayerResult<(Tensor, Option<Tensor>)> {
        if grad.ndim() != 2 || grad.rows() != self.len() {
            return Err(LayerError::ShapeMismatch {
                expected: vec![self.len(), self.embed.cols()],
                actual: grad.shape().to_vec(),
            });
        }
        let positives = grad.slice_rows(0, self.num_positives)?;
        if self.neg_multiple == 0 {
            return Ok((positives, None));
        }
        let negatives = grad.slice_rows(self.num_positives, grad.rows())?;
        Ok((positives, Some(negatives)))
    }
}

/// Concatenates positives and sampled negatives into one item batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegativeAugmenter;

impl NegativeAugmenter {
    /// Creates an augmenter.
    pub fn new() -> Self {
        Self
    }

    /// Builds the augmented item tensors.
    ///
    /// Without negatives the positives pass through unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use mf_layers::augment::{NegativeAugmenter, NegativeSamples};
    /// use mf_layers::tensor::Tensor;
    ///
    /// let pos = Tensor::from_data(&[2, 1], vec![1.0, 2.0]);
    /// let neg = Tensor::from_data(&[2, 2, 1], vec![10.0, 11.0, 20.0, 21.0]);
    /// let out = NegativeAugmenter::new()
    ///     .augment(
    ///         &pos,
    ///         &[1, 2],
    ///         Some(NegativeSamples { embed: &neg, item_idx: &[10, 11, 20, 21], neg_multiple: 2 }),
    ///     )
    ///     .unwrap();
    /// assert_eq!(out.embed.data(), &[1.0, 2.0, 10.0, 11.0, 20.0, 21.0]);
    /// assert_eq!(out.item_idx, vec![1, 2, 10, 11, 20, 21]);
    /// ```
    pub fn augment(
        &self,
        pos_embed: &Tensor,
        pos_idx: &[i64],
        negatives: Option<NegativeSamples<'_>>,
    ) -> LayerResult<AugmentedItems> {
        if pos_embed.ndim() != 2 || pos_embed.rows() != pos_idx.len() {
            return Err(LayerError::ShapeMismatch {
                expected: vec![pos_idx.len(), pos_embed.cols()],
                actual: pos_embed.shape().to_vec(),
            });
        }
        let batch_size = pos_idx.len();
        let dim = pos_embed.cols();

        let Some(neg) = negatives else {
            return Ok(AugmentedItems {
                embed: pos_embed.clone(),
                item_idx: pos_idx.to_vec(),
                num_positives: batch_size,
                neg_multiple: 0,
            });
        };

        let num_neg = batch_size * neg.neg_multiple;
        let neg_embed = match neg.embed.shape() {
            [b, n, d] if *b == batch_size && *n == neg.neg_multiple && *d == dim => {
                neg.embed.reshape(&[num_neg, dim])?
            }
            [r, d] if *r == num_neg && *d == dim => neg.embed.clone(),
            other => {
                return Err(LayerError::ShapeMismatch {
                    expected: vec![batch_size, neg.neg_multiple, dim],
                    actual: other.to_vec(),
                })
            }
        };
        if neg.item_idx.len() != num_neg {
            return Err(LayerError::ShapeMismatch {
                expected: vec![batch_size, neg.neg_multiple],
                actual: vec![neg.item_idx.len()],
            });
        }

        let embed = Tensor::concat_rows(&[pos_embed, &neg_embed])?;
        let mut item_idx = Vec::with_capacity(batch_size + num_neg);
        item_idx.extend_from_slice(pos_idx);
        item_idx.extend_from_slice(neg.item_idx);
        Ok(AugmentedItems {
            embed,
            item_idx,
            num_positives: batch_size,
            neg_multiple: neg.neg_multiple,
        })
    }
}
