//! Conditional adversarial model: networks, objectives, and variant dispatch.

pub mod config;
pub mod discriminator;
pub mod embedding;
pub mod generator;
pub mod model;
pub mod objective;

pub use config::{ModelConfig, SpatialChain, TrainOptions, Variant, SPLIT_TAG_WIDTH};
pub use discriminator::{Discriminator, DiscriminatorTrace};
pub use embedding::TagProjector;
pub use generator::Generator;
pub use model::CondGan;

/// Negative-slope coefficient shared by every leaky rectifier in both
/// networks.
pub const LRELU_SLOPE: f32 = 0.2;
