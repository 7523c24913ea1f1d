//! CLI command implementations.

mod losses;
mod train;

pub use losses::LossesCommand;
pub use train::{TrainCommand, TrainSummary};
