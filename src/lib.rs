//! Conditional adversarial image training.
//!
//! This crate trains a tag-conditioned generator against a discriminator
//! over 64x64 face images, with three interchangeable objectives:
//! - standard sigmoid cross-entropy (DCGAN)
//! - Wasserstein with weight clipping (WGAN)
//! - Wasserstein with gradient penalty (WGAN_v2)
//!
//! The numeric core is a small reverse-mode autograd over flat `f32`
//! tensors; networks are plain structs owning their layers, and the
//! objective variant is a value dispatched over at each step.

pub mod autograd;
pub mod checkpoint;
pub mod cli;
pub mod data;
pub mod error;
pub mod gan;
pub mod nn;
pub mod optim;
pub mod sample;
pub mod train;

pub use autograd::Tensor;
pub use error::{Error, Result};
pub use gan::{CondGan, ModelConfig, TrainOptions, Variant};
pub use train::Trainer;
