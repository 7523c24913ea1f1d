//! The matrix-factorization model: a hashed embedding table shared by users
//! and items, a feature pooler and a dot-product scorer.

use mf_data::Batch;
use mf_layers::{
    AugmentedItems, DotScorer, EmbeddingBag, FeatureBag, HashEmbeddingTable, NegativeAugmenter,
    NegativeSamples, PooledEmbedding, SparseGradients, Tensor,
};
use mf_loss::LossInput;
use mf_optimizer::OptimizerDyn;
use tracing::info;

use crate::config::MatrixFactorizationConfig;
use crate::error::TrainingResult;

/// Everything a training step needs from the forward pass.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// Pooled users `[B, D]` with their tape
    pub user: PooledEmbedding,
    /// Pooled positive items `[B, D]` with their tape
    pub item: PooledEmbedding,
    /// Pooled negatives `[B * N, D]` with their tape
    pub negatives: Option<PooledEmbedding>,
    /// Positives followed by negatives
    pub augmented: AugmentedItems,
}

impl ForwardPass {
    /// Loss inputs aligned with `batch`.
    pub fn loss_input<'a>(&'a self, batch: &'a Batch) -> LossInput<'a> {
        LossInput::new(
            &self.user.embed,
            &self.augmented.embed,
            &batch.label,
            &batch.weight,
            &batch.user_idx,
            &self.augmented.item_idx,
        )
    }
}

/// Matrix factorization over hashed features.
///
/// Forward passes only read the table. It changes only through
/// [`MatrixFactorization::apply_gradients`].
#[derive(Debug, Clone)]
pub struct MatrixFactorization {
    table: HashEmbeddingTable,
    pooler: EmbeddingBag,
    scorer: DotScorer,
    augmenter: NegativeAugmenter,
}

impl MatrixFactorization {
    /// Builds and initializes the model.
    pub fn new(config: &MatrixFactorizationConfig) -> TrainingResult<Self> {
        config.validate()?;
        let table = HashEmbeddingTable::with_initializer(
            config.num_embeddings,
            config.embedding_dim,
            &config.initializer,
            config.seed,
        )?;
        info!(
            num_embeddings = config.num_embeddings,
            embedding_dim = config.embedding_dim,
            initializer = config.initializer.name(),
            max_norm = ?config.max_norm,
            normalize = config.normalize,
            "built matrix factorization model"
        );
        Self::from_parts(table, config.pooler_config().build()?)
    }

    /// Assembles a model around an existing table.
    pub fn from_parts(table: HashEmbeddingTable, pooler: EmbeddingBag) -> TrainingResult<Self> {
        Ok(Self {
            table,
            pooler,
            scorer: DotScorer::new(),
            augmenter: NegativeAugmenter::new(),
        })
    }

    /// The embedding table.
    pub fn table(&self) -> &HashEmbeddingTable {
        &self.table
    }

    /// The feature pooler.
    pub fn pooler(&self) -> &EmbeddingBag {
        &self.pooler
    }

    /// Pools one side of a batch into `[rows, D]` embeddings.
    pub fn embed(&self, features: &FeatureBag) -> TrainingResult<Tensor> {
        Ok(self.pooler.pool(&self.table, features)?)
    }

    /// Scores each user against its positive item, `[B]`.
    ///
    /// Row `i` of the result is aligned with `batch.user_idx[i]` and
    /// `batch.label[i]`.
    pub fn score(&self, batch: &Batch) -> TrainingResult<Tensor> {
        let user = self.embed(&batch.user_features)?;
        let item = self.embed(&batch.item_features)?;
        Ok(self.scorer.score(&user, &item)?)
    }

    /// Pools every side of the batch and augments the items with negatives.
    pub fn forward(&self, batch: &Batch) -> TrainingResult<ForwardPass> {
        let user = self.pooler.pool_train(&self.table, &batch.user_features)?;
        let item = self.pooler.pool_train(&self.table, &batch.item_features)?;
        let negatives = match &batch.negatives {
            Some(neg) => Some(self.pooler.pool_train(&self.table, &neg.features)?),
            None => None,
        };
        let samples = match (&batch.negatives, &negatives) {
            (Some(neg), Some(pooled)) => Some(NegativeSamples {
                embed: &pooled.embed,
                item_idx: &neg.item_idx,
                neg_multiple: neg.neg_multiple,
            }),
            _ => None,
        };
        let augmented = self
            .augmenter
            .augment(&item.embed, &batch.item_idx, samples)?;
        Ok(ForwardPass {
            user,
            item,
            negatives,
            augmented,
        })
    }

    /// Turns embedding gradients into row-sparse table gradients.
    ///
    /// `item_grad` covers the augmented item rows `[B * (1 + N), D]`.
    pub fn backward(
        &self,
        pass: &ForwardPass,
        user_grad: &Tensor,
        item_grad: &Tensor,
    ) -> TrainingResult<SparseGradients> {
        let (pos_grad, neg_grad) = pass.augmented.split_gradient(item_grad)?;
        let mut grads = self.pooler.backward(&self.table, &pass.user.tape, user_grad)?;
        grads.merge(self.pooler.backward(&self.table, &pass.item.tape, &pos_grad)?);
        if let (Some(negatives), Some(neg_grad)) = (&pass.negatives, neg_grad) {
            grads.merge(self.pooler.backward(&self.table, &negatives.tape, &neg_grad)?);
        }
        Ok(grads)
    }

    /// Runs one optimizer step and returns the number of rows updated.
    ///
    /// Sparse optimizers visit only rows with gradients. Dense optimizers
    /// visit every row, with a zero gradient for untouched ones.
    pub fn apply_gradients(
        &mut self,
        optimizer: &mut dyn OptimizerDyn,
        grads: &SparseGradients,
    ) -> TrainingResult<usize> {
        optimizer.begin_step();
        if optimizer.is_sparse() {
            let rows = grads.sorted_rows();
            for &row in &rows {
                if let Some(grad) = grads.get(row) {
                    optimizer.apply_gradients(row as u64, self.table.row_mut(row)?, grad);
                }
            }
            return Ok(rows.len());
        }
        let zeros = vec![0.0; self.table.dim()];
        let num_rows = self.table.num_buckets();
        for row in 0..num_rows {
            let grad = grads.get(row).unwrap_or(zeros.as_slice());
            optimizer.apply_gradients(row as u64, self.table.row_mut(row)?, grad);
        }
        Ok(num_rows)
    }
}
