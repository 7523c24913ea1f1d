//! Row-wise norm constraints applied to pooled embeddings.
//!
//! Each constraint maps one embedding row to another and knows how to push a
//! gradient back through itself, so the pooler can chain them.

use serde::{Deserialize, Serialize};

use crate::tensor::{dot, l2_norm, Tensor};

/// Norms at or below this value are treated as zero.
pub const NORM_EPS: f32 = 1e-12;

/// Constraint types supported for pooled embeddings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Constraint {
    /// Rescale rows whose L2 norm exceeds `max_value` down to `max_value`.
    MaxNorm { max_value: f32 },
    /// Project rows onto the unit sphere. Zero rows are left untouched.
    UnitNorm,
}

impl Constraint {
    /// Factor applied to a row of the given norm.
    fn factor(&self, norm: f32) -> f32 {
        match *self {
            Constraint::MaxNorm { max_value } => {
                if norm > max_value {
                    max_value / norm
                } else {
                    1.0
                }
            }
            Constraint::UnitNorm => {
                if norm > NORM_EPS {
                    1.0 / norm
                } else {
                    1.0
                }
            }
        }
    }

    /// Returns true when the factor depends on the row (and hence on its gradient).
    fn is_active(&self, norm: f32) -> bool {
        match *self {
            Constraint::MaxNorm { max_value } => norm > max_value,
            Constraint::UnitNorm => norm > NORM_EPS,
        }
    }

    /// Applies the constraint to a single row in place.
    pub fn apply_row(&self, row: &mut [f32]) {
        let factor = self.factor(l2_norm(row));
        if factor != 1.0 {
            row.iter_mut().for_each(|x| *x *= factor);
        }
    }

    /// Applies the constraint to every row of a 2D tensor.
    pub fn apply(&self, param: &Tensor) -> Tensor {
        let mut out = param.clone();
        for i in 0..out.rows() {
            self.apply_row(out.row_mut(i));
        }
        out
    }

    /// Gradient with respect to the constraint input.
    ///
    /// `input` is the row the constraint was applied to and `grad` the gradient
    /// of the loss with respect to the constrained row. When the constraint
    /// rescales `x` to `c * x / |x|` the Jacobian is
    /// `(c / |x|) * (I - x x^T / |x|^2)`.
    pub fn backward_row(&self, input: &[f32], grad: &[f32]) -> Vec<f32> {
        let norm = l2_norm(input);
        if !self.is_active(norm) {
            return grad.to_vec();
        }
        let factor = self.factor(norm);
        let projection = dot(grad, input) / (norm * norm);
        grad.iter()
            .zip(input)
            .map(|(&g, &x)| factor * (g - projection * x))
            .collect()
    }
}
