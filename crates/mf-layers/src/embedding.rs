//! Hashed embedding table and weighted embedding-bag pooling.
//!
//! This module provides the [`HashEmbeddingTable`] (a dense
//! `[num_buckets, dim]` matrix addressed by pre-hashed feature ids) and the
//! [`EmbeddingBag`] pooler which turns a bag of `(hash, weight)` pairs into a
//! single embedding per entity:
//!
//! ```text
//! pooled_i = sum_f weight[i, f] * W[hash[i, f]]
//! clipped  = pooled_i * min(1, max_norm / |pooled_i|)      (optional)
//! embed_i  = clipped / |clipped|                           (optional)
//! ```
//!
//! Lookups never mutate the table. Training lookups return a [`PoolTape`]
//! which [`EmbeddingBag::backward`] turns into [`SparseGradients`] covering
//! only the addressed rows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::tensor::Tensor;

/// A batch of hashed feature sets, one row per entity.
///
/// Hashes are stored flattened as `[num_rows, num_features]`. Weights are
/// optional and default to `1.0`.
///
/// # Example
///
/// ```
/// use mf_layers::embedding::FeatureBag;
///
/// let bag = FeatureBag::from_rows(&[vec![0, 3], vec![1, 2]], None).unwrap();
/// assert_eq!(bag.num_rows(), 2);
/// assert_eq!(bag.num_features(), 2);
/// assert_eq!(bag.weight(1, 0), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBag {
    num_rows: usize,
    num_features: usize,
    hashes: Vec<i64>,
    weights: Option<Vec<f32>>,
}

impl FeatureBag {
    /// Creates a bag from flattened hashes and optional flattened weights.
    pub fn new(
        num_rows: usize,
        num_features: usize,
        hashes: Vec<i64>,
        weights: Option<Vec<f32>>,
    ) -> LayerResult<Self> {
        let numel = num_rows * num_features;
        if hashes.len() != numel {
            return Err(LayerError::ShapeMismatch {
                expected: vec![num_rows, num_features],
                actual: vec![hashes.len()],
            });
        }
        if let Some(weights) = &weights {
            if weights.len() != numel {
                return Err(LayerError::ShapeMismatch {
                    expected: vec![num_rows, num_features],
                    actual: vec![weights.len()],
                });
            }
        }
        Ok(Self {
            num_rows,
            num_features,
            hashes,
            weights,
        })
    }

    /// Creates a bag from per-entity rows. All rows must have the same length,
    /// and weights (when given) must mirror the hashes row for row.
    pub fn from_rows(hashes: &[Vec<i64>], weights: Option<&[Vec<f32>]>) -> LayerResult<Self> {
        let num_rows = hashes.len();
        let num_features = hashes.first().map(|r| r.len()).unwrap_or(0);
        let mut flat = Vec::with_capacity(num_rows * num_features);
        for row in hashes {
            if row.len() != num_features {
                return Err(LayerError::ShapeMismatch {
                    expected: vec![num_rows, num_features],
                    actual: vec![num_rows, row.len()],
                });
            }
            flat.extend_from_slice(row);
        }
        let weights = match weights {
            Some(rows) => {
                if rows.len() != num_rows {
                    return Err(LayerError::ShapeMismatch {
                        expected: vec![num_rows, num_features],
                        actual: vec![rows.len()],
                    });
                }
                let mut flat_w = Vec::with_capacity(num_rows * num_features);
                for row in rows {
                    if row.len() != num_features {
                        return Err(LayerError::ShapeMismatch {
                            expected: vec![num_rows, num_features],
                            actual: vec![num_rows, row.len()],
                        });
                    }
                    flat_w.extend_from_slice(row);
                }
                Some(flat_w)
            }
            None => None,
        };
        Self::new(num_rows, num_features, flat, weights)
    }

    /// Number of entities in the bag.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of hashed features per entity.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Flattened hashes.
    pub fn hashes(&self) -> &[i64] {
        &self.hashes
    }

    /// Flattened weights, if any were supplied.
    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }

    /// Hashes of entity `row`.
    pub fn row_hashes(&self, row: usize) -> &[i64] {
        &self.hashes[row * self.num_features..(row + 1) * self.num_features]
    }

    /// Weight of feature `feature` of entity `row`.
    pub fn weight(&self, row: usize, feature: usize) -> f32 {
        self.weights
            .as_ref()
            .map(|w| w[row * self.num_features + feature])
            .unwrap_or(1.0)
    }
}

/// Dense embedding table addressed by feature hash.
///
/// The bucket count is typically `2^k + 1`; an odd size spreads hash
/// collisions. The dimension is fixed for the table's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashEmbeddingTable {
    /// Weights of shape `[num_buckets, dim]`
    weights: Tensor,
}

impl HashEmbeddingTable {
    /// Creates a zero-initialized table.
    ///
    /// # Example
    ///
    /// ```
    /// use mf_layers::embedding::HashEmbeddingTable;
    ///
    /// let table = HashEmbeddingTable::new(17, 4);
    /// assert_eq!(table.num_buckets(), 17);
    /// assert_eq!(table.dim(), 4);
    /// ```
    pub fn new(num_buckets: usize, dim: usize) -> Self {
        Self {
            weights: Tensor::zeros(&[num_buckets, dim]),
        }
    }

    /// Creates a table filled by `initializer`.
    pub fn with_initializer(
        num_buckets: usize,
        dim: usize,
        initializer: &Initializer,
        seed: Option<u64>,
    ) -> LayerResult<Self> {
        if num_buckets == 0 || dim == 0 {
            return Err(LayerError::ConfigError {
                message: format!(
                    "embedding table needs at least one bucket and one dimension, got [{num_buckets}, {dim}]"
                ),
            });
        }
        Ok(Self {
            weights: initializer.initialize(&[num_buckets, dim], seed)?,
        })
    }

    /// Wraps an existing `[num_buckets, dim]` weight matrix.
    pub fn from_tensor(weights: Tensor) -> LayerResult<Self> {
        if weights.ndim() != 2 {
            return Err(LayerError::InvalidInputDimension {
                expected: 2,
                actual: weights.ndim(),
            });
        }
        Ok(Self { weights })
    }

    /// Returns the number of rows.
    pub fn num_buckets(&self) -> usize {
        self.weights.rows()
    }

    /// Returns the embedding dimension.
    pub fn dim(&self) -> usize {
        self.weights.cols()
    }

    /// Returns the full weight matrix.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Resolves a hash to a row index.
    pub fn resolve(&self, hash: i64) -> LayerResult<usize> {
        let num_buckets = self.num_buckets();
        match usize::try_from(hash) {
            Ok(row) if row < num_buckets => Ok(row),
            _ => Err(LayerError::HashOutOfRange { hash, num_buckets }),
        }
    }

    /// Returns the row addressed by `hash`.
    pub fn get(&self, hash: i64) -> LayerResult<&[f32]> {
        let row = self.resolve(hash)?;
        Ok(self.weights.row(row))
    }

    /// Returns row `row` mutably. Used by optimizers between steps.
    pub fn row_mut(&mut self, row: usize) -> LayerResult<&mut [f32]> {
        if row >= self.num_buckets() {
            return Err(LayerError::HashOutOfRange {
                hash: row as i64,
                num_buckets: self.num_buckets(),
            });
        }
        Ok(self.weights.row_mut(row))
    }
}

/// Row-sparse gradient of an embedding table: row index to accumulated delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseGradients {
    dim: usize,
    rows: HashMap<usize, Vec<f32>>,
}

impl SparseGradients {
    /// Creates an empty accumulator for rows of width `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            rows: HashMap::new(),
        }
    }

    /// Adds `scale * grad` to the accumulated gradient of `row`.
    pub fn accumulate(&mut self, row: usize, grad: &[f32], scale: f32) {
        debug_assert_eq!(grad.len(), self.dim);
        let acc = self
            .rows
            .entry(row)
            .or_insert_with(|| vec![0.0; grad.len()]);
        for (a, &g) in acc.iter_mut().zip(grad) {
            *a += scale * g;
        }
    }

    /// Merges another accumulator into this one.
    pub fn merge(&mut self, other: SparseGradients) {
        for (row, grad) in other.rows {
            self.accumulate(row, &grad, 1.0);
        }
    }

    /// Returns the accumulated gradient for `row`.
    pub fn get(&self, row: usize) -> Option<&[f32]> {
        self.rows.get(&row).map(|v| v.as_slice())
    }

    /// Returns the row width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the number of touched rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no row was touched.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over `(row, gradient)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[f32])> {
        self.rows.iter().map(|(&row, g)| (row, g.as_slice()))
    }

    /// Touched row indices in ascending order.
    pub fn sorted_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.rows.keys().copied().collect();
        rows.sort_unstable();
        rows
    }
}

/// Post-processing applied to pooled embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingBagConfig {
    /// Upper bound for the L2 norm of each pooled embedding.
    pub max_norm: Option<f32>,
    /// Project pooled embeddings onto the unit sphere.
    pub normalize: bool,
}

impl EmbeddingBagConfig {
    /// Creates a config with neither clipping nor normalization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the max-norm bound.
    pub fn with_max_norm(mut self, max_norm: Option<f32>) -> Self {
        self.max_norm = max_norm;
        self
    }

    /// Enables or disables normalization.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Builds the pooler.
    pub fn build(self) -> LayerResult<EmbeddingBag> {
        EmbeddingBag::new(self)
    }
}

/// Values captured by a training lookup that the backward pass needs.
#[derive(Debug, Clone)]
pub struct PoolTape {
    /// Resolved table rows, flattened `[num_rows, num_features]`
    rows: Vec<usize>,
    /// Feature weights, flattened like `rows`
    weights: Vec<f32>,
    num_rows: usize,
    num_features: usize,
    /// Input of each constraint stage, in application order
    stage_inputs: Vec<Tensor>,
}

impl PoolTape {
    /// Number of pooled entities.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }
}

/// Output of a training lookup.
#[derive(Debug, Clone)]
pub struct PooledEmbedding {
    /// Pooled embeddings of shape `[num_rows, dim]`
    pub embed: Tensor,
    /// Tape for [`EmbeddingBag::backward`]
    pub tape: PoolTape,
}

/// Weighted sum pooling over hashed feature bags.
///
/// # Example
///
/// ```
/// use mf_layers::embedding::{EmbeddingBagConfig, FeatureBag, HashEmbeddingTable};
/// use mf_layers::initializer::Initializer;
///
/// let table = HashEmbeddingTable::with_initializer(9, 4, &Initializer::default(), Some(0)).unwrap();
/// let bag = FeatureBag::from_rows(&[vec![1, 2], vec![3, 8]], None).unwrap();
/// let pooler = EmbeddingBagConfig::new().with_normalize(true).build().unwrap();
///
/// let embed = pooler.pool(&table, &bag).unwrap();
/// assert_eq!(embed.shape(), &[2, 4]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingBag {
    config: EmbeddingBagConfig,
    /// Constraints applied after pooling, in order
    stages: Vec<Constraint>,
}

impl EmbeddingBag {
    /// Creates a pooler from its config.
    pub fn new(config: EmbeddingBagConfig) -> LayerResult<Self> {
        let mut stages = Vec::with_capacity(2);
        if let Some(max_value) = config.max_norm {
            if !(max_value.is_finite() && max_value > 0.0) {
                return Err(LayerError::ConfigError {
                    message: format!("max_norm must be positive and finite, got {max_value}"),
                });
            }
            stages.push(Constraint::MaxNorm { max_value });
        }
        if config.normalize {
            stages.push(Constraint::UnitNorm);
        }
        Ok(Self { config, stages })
    }

    /// Returns the pooler config.
    pub fn config(&self) -> &EmbeddingBagConfig {
        &self.config
    }

    /// Pools `bag` against `table`. Pure function of the current table state.
    pub fn pool(&self, table: &HashEmbeddingTable, bag: &FeatureBag) -> LayerResult<Tensor> {
        let (mut embed, _) = self.pooled_sum(table, bag)?;
        for stage in &self.stages {
            embed = stage.apply(&embed);
        }
        Ok(embed)
    }

    /// Pools `bag` and records a tape for the backward pass.
    pub fn pool_train(
        &self,
        table: &HashEmbeddingTable,
        bag: &FeatureBag,
    ) -> LayerResult<PooledEmbedding> {
        let (mut embed, rows) = self.pooled_sum(table, bag)?;
        let mut stage_inputs = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let next = stage.apply(&embed);
            stage_inputs.push(std::mem::replace(&mut embed, next));
        }
        let weights = (0..bag.num_rows())
            .flat_map(|i| (0..bag.num_features()).map(move |f| bag.weight(i, f)))
            .collect();
        Ok(PooledEmbedding {
            embed,
            tape: PoolTape {
                rows,
                weights,
                num_rows: bag.num_rows(),
                num_features: bag.num_features(),
                stage_inputs,
            },
        })
    }

    /// Turns the gradient with respect to pooled embeddings into row-sparse
    /// table gradients.
    pub fn backward(
        &self,
        table: &HashEmbeddingTable,
        tape: &PoolTape,
        grad: &Tensor,
    ) -> LayerResult<SparseGradients> {
        let dim = table.dim();
        let num_rows = tape.num_rows();
        if grad.shape() != [num_rows, dim] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![num_rows, dim],
                actual: grad.shape().to_vec(),
            });
        }
        if tape.stage_inputs.len() != self.stages.len() {
            return Err(LayerError::BackwardError {
                message: format!(
                    "tape recorded {} stages but pooler has {}",
                    tape.stage_inputs.len(),
                    self.stages.len()
                ),
            });
        }

        let mut sparse = SparseGradients::new(dim);
        for i in 0..num_rows {
            let mut g = grad.row(i).to_vec();
            for (stage, input) in self.stages.iter().zip(&tape.stage_inputs).rev() {
                g = stage.backward_row(input.row(i), &g);
            }
            for f in 0..tape.num_features {
                let k = i * tape.num_features + f;
                sparse.accumulate(tape.rows[k], &g, tape.weights[k]);
            }
        }
        Ok(sparse)
    }

    /// Weighted sum over the addressed rows, plus the resolved row indices.
    fn pooled_sum(
        &self,
        table: &HashEmbeddingTable,
        bag: &FeatureBag,
    ) -> LayerResult<(Tensor, Vec<usize>)> {
        let dim = table.dim();
        let mut output = Tensor::zeros(&[bag.num_rows(), dim]);
        let mut rows = Vec::with_capacity(bag.hashes().len());
        for i in 0..bag.num_rows() {
            let out = output.row_mut(i);
            for (f, &hash) in bag.row_hashes(i).iter().enumerate() {
                let row = table.resolve(hash)?;
                let weight = bag.weight(i, f);
                for (o, &v) in out.iter_mut().zip(table.weights.row(row)) {
                    *o += weight * v;
                }
                rows.push(row);
            }
        }
        Ok((output, rows))
    }
}
