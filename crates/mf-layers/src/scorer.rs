//! User-item affinity scoring.

use crate::error::{LayerError, LayerResult};
use crate::tensor::{dot, Tensor};

/// Scores user-item pairs as the dot product of their pooled embeddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct DotScorer;

impl DotScorer {
    /// Creates a scorer.
    pub fn new() -> Self {
        Self
    }

    /// Row-wise dot product of `[B, D]` user and item embeddings, giving `[B]`.
    ///
    /// Row `i` of the output is aligned with row `i` of both inputs.
    pub fn score(&self, user_embed: &Tensor, item_embed: &Tensor) -> LayerResult<Tensor> {
        if user_embed.ndim() != 2 || user_embed.shape() != item_embed.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: user_embed.shape().to_vec(),
                actual: item_embed.shape().to_vec(),
            });
        }
        let scores = user_embed
            .iter_rows()
            .zip(item_embed.iter_rows())
            .map(|(u, v)| dot(u, v))
            .collect::<Vec<_>>();
        Ok(Tensor::from_data(&[user_embed.rows()], scores))
    }

    /// All-pairs scores `[B, M]` between `[B, D]` users and `[M, D]` items.
    pub fn score_matrix(&self, user_embed: &Tensor, item_embed: &Tensor) -> LayerResult<Tensor> {
        if user_embed.ndim() != 2 || item_embed.ndim() != 2 || user_embed.cols() != item_embed.cols()
        {
            return Err(LayerError::ShapeMismatch {
                expected: vec![item_embed.rows(), user_embed.cols()],
                actual: item_embed.shape().to_vec(),
            });
        }
        Ok(user_embed.matmul(&item_embed.transpose()))
    }

    /// Gradients of `sum_i grad[i] * score_i` with respect to both inputs.
    pub fn backward(
        &self,
        user_embed: &Tensor,
        item_embed: &Tensor,
        grad: &[f32],
    ) -> LayerResult<(Tensor, Tensor)> {
        if grad.len() != user_embed.rows() || user_embed.shape() != item_embed.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: vec![user_embed.rows()],
                actual: vec![grad.len()],
            });
        }
        let mut user_grad = Tensor::zeros(user_embed.shape());
        let mut item_grad = Tensor::zeros(item_embed.shape());
        for (i, &g) in grad.iter().enumerate() {
            for (d, (&u, &v)) in user_embed.row(i).iter().zip(item_embed.row(i)).enumerate() {
                user_grad.row_mut(i)[d] = g * v;
                item_grad.row_mut(i)[d] = g * u;
            }
        }
        Ok((user_grad, item_grad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_rowwise_dot() {
        let users = Tensor::from_data(&[2, 2], vec![1.0, 2.0, 0.5, -1.0]);
        let items = Tensor::from_data(&[2, 2], vec![3.0, 1.0, 2.0, 2.0]);
        let scores = DotScorer::new().score(&users, &items).unwrap();
        assert_eq!(scores.shape(), &[2]);
        assert_eq!(scores.data(), &[5.0, -1.0]);
    }

    #[test]
    fn test_score_matrix_diagonal_matches_score() {
        let users = Tensor::from_data(&[2, 2], vec![1.0, 2.0, 0.5, -1.0]);
        let items = Tensor::from_data(&[3, 2], vec![3.0, 1.0, 2.0, 2.0, 0.0, 1.0]);
        let scorer = DotScorer::new();
        let m = scorer.score_matrix(&users, &items).unwrap();
        assert_eq!(m.shape(), &[2, 3]);
        assert_eq!(m.row(0), &[5.0, 6.0, 2.0]);
        assert_eq!(m.row(1), &[0.5, -1.0, -1.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let users = Tensor::zeros(&[2, 3]);
        let items = Tensor::zeros(&[2, 2]);
        assert!(DotScorer::new().score(&users, &items).is_err());
        assert!(DotScorer::new().score_matrix(&users, &items).is_err());
    }

    #[test]
    fn test_backward() {
        let users = Tensor::from_data(&[1, 2], vec![1.0, 2.0]);
        let items = Tensor::from_data(&[1, 2], vec![3.0, 4.0]);
        let (gu, gi) = DotScorer::new().backward(&users, &items, &[2.0]).unwrap();
        assert_eq!(gu.data(), &[6.0, 8.0]);
        assert_eq!(gi.data(), &[2.0, 4.0]);
    }
}
