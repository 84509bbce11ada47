//! Neural network building blocks
//!
//! Thin layer structs over the autograd operations. Each layer owns its
//! parameter tensors and exposes them through `parameters()` /
//! `parameters_mut()` for the optimizers.

mod conv;
pub mod init;
mod linear;
mod norm;

pub use conv::{Conv2d, Deconv2d};
pub use linear::Linear;
pub use norm::{BatchNorm, BN_EPSILON, BN_MOMENTUM};
