//! Embedding layers for matrix-factorization retrieval.
//!
//! This crate provides the building blocks that turn hashed categorical
//! features into dense user and item vectors:
//!
//! - **Tensor**: a small dense row-major `f32` tensor
//! - **Embeddings**: a hashed embedding table and a weighted embedding-bag
//!   pooler with optional max-norm clipping and L2 normalization
//! - **Constraints**: the row-wise norm constraints used by the pooler
//! - **Scorer**: dot-product affinity between pooled embeddings
//! - **Augmenter**: concatenation of sampled negative items onto the item side
//! - **Initializers**: table initialization strategies
//!
//! # Quick Start
//!
//! ```
//! use mf_layers::prelude::*;
//!
//! let table = HashEmbeddingTable::with_initializer(17, 4, &Initializer::default(), Some(42)).unwrap();
//! let pooler = EmbeddingBagConfig::new().with_normalize(true).build().unwrap();
//!
//! let users = FeatureBag::from_rows(&[vec![0, 3], vec![1, 16]], None).unwrap();
//! let items = FeatureBag::from_rows(&[vec![5], vec![7]], None).unwrap();
//!
//! let user_embed = pooler.pool(&table, &users).unwrap();
//! let item_embed = pooler.pool(&table, &items).unwrap();
//! let scores = DotScorer::new().score(&user_embed, &item_embed).unwrap();
//! assert_eq!(scores.shape(), &[2]);
//! ```
//!
//! # Sparse Gradients
//!
//! Lookups never mutate the table. A training lookup records a tape, and the
//! backward pass yields gradients only for the rows the batch addressed:
//!
//! ```
//! use mf_layers::prelude::*;
//!
//! let table = HashEmbeddingTable::with_initializer(9, 2, &Initializer::default(), Some(0)).unwrap();
//! let pooler = EmbeddingBag::new(EmbeddingBagConfig::new()).unwrap();
//! let bag = FeatureBag::from_rows(&[vec![2, 4]], None).unwrap();
//!
//! let pooled = pooler.pool_train(&table, &bag).unwrap();
//! let grads = pooler.backward(&table, &pooled.tape, &Tensor::ones(&[1, 2])).unwrap();
//! assert_eq!(grads.sorted_rows(), vec![2, 4]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod augment;
pub mod constraint;
pub mod embedding;
pub mod error;
pub mod initializer;
pub mod scorer;
pub mod tensor;

// Re-export main types at crate level
pub use augment::{AugmentedItems, NegativeAugmenter, NegativeSamples};
pub use constraint::{Constraint, NORM_EPS};
pub use embedding::{
    EmbeddingBag, EmbeddingBagConfig, FeatureBag, HashEmbeddingTable, PoolTape, PooledEmbedding,
    SparseGradients,
};
pub use error::{LayerError, LayerResult};
pub use initializer::Initializer;
pub use scorer::DotScorer;
pub use tensor::Tensor;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```
/// use mf_layers::prelude::*;
/// ```
pub mod prelude {
    pub use crate::augment::{AugmentedItems, NegativeAugmenter, NegativeSamples};
    pub use crate::constraint::Constraint;
    pub use crate::embedding::{
        EmbeddingBag, EmbeddingBagConfig, FeatureBag, HashEmbeddingTable, PooledEmbedding,
        SparseGradients,
    };
    pub use crate::error::{LayerError, LayerResult};
    pub use crate::initializer::Initializer;
    pub use crate::scorer::DotScorer;
    pub use crate::tensor::Tensor;
}
