//! Training loop: batch assembly and the epoch/step orchestrator.

pub mod batch;
mod trainer;

pub use batch::{batch_count, uniform_noise, BatchAssembler, TrainBatch};
pub use trainer::Trainer;
