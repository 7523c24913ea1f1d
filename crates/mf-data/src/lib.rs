//! Batch ingestion for matrix-factorization training.
//!
//! A batch is a key/value record of equal-length columns: `user_idx`,
//! `item_idx`, `user_feature_hashes`, `item_feature_hashes`, `label` and
//! `weight`, plus optional feature weights and an all-or-nothing group of
//! sampled negatives (`neg_item_idx`, `neg_item_feature_hashes`,
//! `neg_item_feature_weights`).
//!
//! # Modules
//!
//! - [`batch`] - [`RawBatch`] (serde form) and the validated [`Batch`]
//! - [`reader`] - [`JsonlBatchReader`], one batch per JSON line
//! - [`prediction`] - [`PredictionRecord`] and its JSON-lines writer
//!
//! # Example
//!
//! ```
//! use mf_data::Batch;
//!
//! let batch = Batch::from_json(r#"{
//!     "user_idx": [7], "item_idx": [9],
//!     "user_feature_hashes": [[1, 2]], "item_feature_hashes": [[3]],
//!     "label": [1.0], "weight": [1.0]
//! }"#).unwrap();
//! assert_eq!(batch.batch_size(), 1);
//! assert!(batch.negatives.is_none());
//! ```

pub mod batch;
pub mod error;
pub mod prediction;
pub mod reader;

pub use batch::{Batch, NegativeItems, RawBatch};
pub use error::{DataError, DataResult};
pub use prediction::{PredictionRecord, PredictionWriter};
pub use reader::JsonlBatchReader;
