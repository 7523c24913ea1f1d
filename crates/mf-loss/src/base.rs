//! The call contract shared by every loss.
//!
//! A loss consumes pooled user embeddings `[B, D]`, augmented item embeddings
//! `[M, D]` (`M >= B`, row `i < B` is the positive of user `i`), per-example
//! labels and sample weights `[B]`, user ids `[B]` and item ids `[M]`, and
//! returns one non-negative scalar together with its gradients with respect
//! to both embedding matrices.

use serde::{Deserialize, Serialize};
use tracing::warn;

use mf_layers::{DotScorer, Tensor};

use crate::error::{LossError, LossResult};

/// How per-example losses are combined into a scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    /// `sum_i w_i l_i / sum_i w_i`
    #[default]
    Mean,
    /// `sum_i w_i l_i`
    Sum,
}

impl Reduction {
    /// Per-example coefficients `c_i` such that the reduced loss is
    /// `sum_i c_i l_i`. A zero total weight under [`Reduction::Mean`] yields
    /// all-zero coefficients.
    pub fn coefficients(&self, sample_weight: &[f32]) -> Vec<f32> {
        match self {
            Reduction::Sum => sample_weight.to_vec(),
            Reduction::Mean => {
                let total: f32 = sample_weight.iter().sum();
                if total > 0.0 {
                    sample_weight.iter().map(|w| w / total).collect()
                } else {
                    if !sample_weight.is_empty() {
                        warn!("sample weights sum to zero, loss reduces to 0");
                    }
                    vec![0.0; sample_weight.len()]
                }
            }
        }
    }
}

/// Borrowed inputs of one loss evaluation.
#[derive(Debug, Clone, Copy)]
pub struct LossInput<'a> {
    /// User embeddings `[B, D]`
    pub user_embed: &'a Tensor,
    /// Augmented item embeddings `[M, D]`
    pub item_embed: &'a Tensor,
    /// Labels `[B]`
    pub label: &'a [f32],
    /// Sample weights `[B]`
    pub sample_weight: &'a [f32],
    /// User ids `[B]`
    pub user_idx: &'a [i64],
    /// Item ids `[M]`
    pub item_idx: &'a [i64],
}

impl<'a> LossInput<'a> {
    /// Bundles the loss inputs.
    pub fn new(
        user_embed: &'a Tensor,
        item_embed: &'a Tensor,
        label: &'a [f32],
        sample_weight: &'a [f32],
        user_idx: &'a [i64],
        item_idx: &'a [i64],
    ) -> Self {
        Self {
            user_embed,
            item_embed,
            label,
            sample_weight,
            user_idx,
            item_idx,
        }
    }

    /// Number of users (`B`).
    pub fn batch_size(&self) -> usize {
        self.user_embed.rows()
    }

    /// Number of augmented item rows (`M`).
    pub fn num_items(&self) -> usize {
        self.item_embed.rows()
    }

    /// Checks that all inputs are aligned and weights are usable.
    pub fn validate(&self) -> LossResult<()> {
        if self.user_embed.ndim() != 2 {
            return Err(LossError::InvalidInput {
                message: format!("user_embed must be 2D, got shape {:?}", self.user_embed.shape()),
            });
        }
        if self.item_embed.ndim() != 2 {
            return Err(LossError::InvalidInput {
                message: format!("item_embed must be 2D, got shape {:?}", self.item_embed.shape()),
            });
        }
        let batch_size = self.batch_size();
        check_len("item_embed dim", self.user_embed.cols(), self.item_embed.cols())?;
        check_len("label", batch_size, self.label.len())?;
        check_len("sample_weight", batch_size, self.sample_weight.len())?;
        check_len("user_idx", batch_size, self.user_idx.len())?;
        check_len("item_idx", self.num_items(), self.item_idx.len())?;
        if self.num_items() < batch_size {
            return Err(LossError::ShapeMismatch {
                what: "item_embed rows",
                expected: batch_size,
                actual: self.num_items(),
            });
        }
        if let Some((i, w)) = self
            .sample_weight
            .iter()
            .enumerate()
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(LossError::InvalidInput {
                message: format!("sample_weight[{i}] must be finite and non-negative, got {w}"),
            });
        }
        Ok(())
    }

    /// All-pairs scores `[B, M]`, `s_ij = u_i . v_j`.
    pub fn scores(&self) -> LossResult<Tensor> {
        Ok(DotScorer::new().score_matrix(self.user_embed, self.item_embed)?)
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> LossResult<()> {
    if expected != actual {
        return Err(LossError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Scalar loss and its gradients.
#[derive(Debug, Clone, PartialEq)]
pub struct LossOutput {
    /// Reduced loss value
    pub value: f32,
    /// Gradient with respect to the user embeddings `[B, D]`
    pub user_grad: Tensor,
    /// Gradient with respect to the item embeddings `[M, D]`
    pub item_grad: Tensor,
}

impl LossOutput {
    /// A zero loss with zero gradients shaped like `input`.
    pub fn zero(input: &LossInput<'_>) -> Self {
        Self {
            value: 0.0,
            user_grad: Tensor::zeros(input.user_embed.shape()),
            item_grad: Tensor::zeros(input.item_embed.shape()),
        }
    }

    /// Returns `self + weight * other`.
    pub fn combine(mut self, other: &LossOutput, weight: f32) -> LossResult<Self> {
        self.value += weight * other.value;
        self.user_grad.add_scaled_(&other.user_grad, weight)?;
        self.item_grad.add_scaled_(&other.item_grad, weight)?;
        Ok(self)
    }
}

/// A loss over user and item embeddings.
pub trait EmbeddingLoss: Send + Sync + std::fmt::Debug {
    /// Registered name, used as the logging key suffix.
    fn name(&self) -> &'static str;

    /// Computes the loss and its gradients.
    fn forward_backward(&self, input: &LossInput<'_>) -> LossResult<LossOutput>;

    /// Computes only the loss value.
    fn forward(&self, input: &LossInput<'_>) -> LossResult<f32> {
        Ok(self.forward_backward(input)?.value)
    }
}

/// Accumulates gradients of a loss written in terms of scores and distances.
pub(crate) struct GradientBuilder<'a> {
    input: &'a LossInput<'a>,
    user_grad: Tensor,
    item_grad: Tensor,
}

impl<'a> GradientBuilder<'a> {
    pub(crate) fn new(input: &'a LossInput<'a>) -> Self {
        Self {
            input,
            user_grad: Tensor::zeros(input.user_embed.shape()),
            item_grad: Tensor::zeros(input.item_embed.shape()),
        }
    }

    /// Adds `g * d s_ij`, where `s_ij = u_i . v_j`.
    pub(crate) fn score(&mut self, i: usize, j: usize, g: f32) {
        if g == 0.0 {
            return;
        }
        let u = self.input.user_embed.row(i);
        let v = self.input.item_embed.row(j);
        for (gu, &vk) in self.user_grad.row_mut(i).iter_mut().zip(v) {
            *gu += g * vk;
        }
        for (gv, &uk) in self.item_grad.row_mut(j).iter_mut().zip(u) {
            *gv += g * uk;
        }
    }

    /// Adds `g * d |u_i - v_j|^2`.
    pub(crate) fn user_item_distance(&mut self, i: usize, j: usize, g: f32) {
        if g == 0.0 {
            return;
        }
        let u = self.input.user_embed.row(i);
        let v = self.input.item_embed.row(j);
        for (k, (&uk, &vk)) in u.iter().zip(v).enumerate() {
            let d = 2.0 * g * (uk - vk);
            self.user_grad.row_mut(i)[k] += d;
            self.item_grad.row_mut(j)[k] -= d;
        }
    }

    /// Adds `g * d |v_j - v_k|^2`.
    pub(crate) fn item_item_distance(&mut self, j: usize, k: usize, g: f32) {
        if g == 0.0 {
            return;
        }
        let dim = self.input.item_embed.cols();
        for c in 0..dim {
            let d = 2.0 * g * (self.input.item_embed.row(j)[c] - self.input.item_embed.row(k)[c]);
            self.item_grad.row_mut(j)[c] += d;
            self.item_grad.row_mut(k)[c] -= d;
        }
    }

    pub(crate) fn finish(self, value: f32) -> LossOutput {
        LossOutput {
            value,
            user_grad: self.user_grad,
            item_grad: self.item_grad,
        }
    }
}

/// Numerically stable `ln(1 + e^x)`.
pub(crate) fn softplus(x: f32) -> f32 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// Numerically stable logistic function.
pub(crate) fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
