//! Autograd operations with backward passes
//!
//! This module provides the differentiable operations the conditional
//! generator and discriminator are assembled from.

mod activations;
mod basic;
mod conv;
mod loss;
mod matmul;
mod norm;
mod reduce;
mod shape;

// Re-export all public operations
pub use activations::{leaky_relu, leaky_relu_mask, relu, tanh_unit};
pub use basic::{add, add_bias, add_scalar, mul, mul_const, scale, sqrt, square, sub};
pub use conv::{conv2d, conv2d_transpose, ConvGeom};
pub use loss::bce_with_logits;
pub use matmul::{matmul, transpose_matrix};
pub use norm::{batch_norm_eval, batch_norm_train, bn_input_grad, BatchStats};
pub use reduce::{mean_all, sum_per_example};
pub use shape::{concat_channels, slice_channels, tile_spatial};
