//! Per-user negative pools over an augmented item batch.
//!
//! The pool of user `i` holds every item row whose id differs from the id of
//! the user's own positive (row `i`). In-batch positives of other users and
//! sampled negatives are both eligible. With a hard negatives ratio `r`, each
//! pool keeps only its `ceil(r * len)` highest-scoring rows.

use mf_layers::Tensor;

/// Negative item rows for every user of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativePools {
    pools: Vec<Vec<usize>>,
}

impl NegativePools {
    /// Builds pools from item ids and the `[B, M]` score matrix.
    ///
    /// `item_idx[i]` for `i < B` is the positive of user `i`. Ties between
    /// equally hard negatives keep their row order.
    pub fn build(item_idx: &[i64], scores: &Tensor, hard_negatives_ratio: Option<f32>) -> Self {
        let batch_size = scores.rows();
        let pools = (0..batch_size)
            .map(|i| {
                let positive = item_idx[i];
                let mut pool: Vec<usize> = item_idx
                    .iter()
                    .enumerate()
                    .filter(|(_, &id)| id != positive)
                    .map(|(j, _)| j)
                    .collect();
                if let Some(ratio) = hard_negatives_ratio {
                    let row = scores.row(i);
                    pool.sort_by(|&a, &b| row[b].total_cmp(&row[a]));
                    pool.truncate(hard_negative_count(pool.len(), ratio));
                    pool.sort_unstable();
                }
                pool
            })
            .collect();
        Self { pools }
    }

    /// Negative rows of user `i`.
    pub fn get(&self, i: usize) -> &[usize] {
        &self.pools[i]
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns true if there are no users.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Total number of (user, negative) pairs.
    pub fn num_pairs(&self) -> usize {
        self.pools.iter().map(Vec::len).sum()
    }

    /// Iterates over `(user, pool)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.pools.iter().enumerate().map(|(i, p)| (i, p.as_slice()))
    }
}

/// Number of negatives kept from a pool of `pool_len` rows.
pub fn hard_negative_count(pool_len: usize, ratio: f32) -> usize {
    let count = (ratio * pool_len as f32).ceil() as usize;
    count.min(pool_len)
}
