//! Fully-connected layer

use crate::autograd::ops::{add_bias, matmul};
use crate::autograd::Tensor;
use crate::nn::init::{gaussian_vec, INIT_STDDEV};
use rand::Rng;

/// Affine projection `y = x W + b` over flattened `[batch, in_features]`
/// inputs. The weight is stored row-major as `[in_features, out_features]`.
pub struct Linear {
    pub weight: Tensor,
    pub bias: Tensor,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a layer with `N(0, 0.02)` weights and zero bias.
    pub fn new<R: Rng>(rng: &mut R, in_features: usize, out_features: usize) -> Self {
        Self {
            weight: Tensor::from_vec(
                gaussian_vec(rng, in_features * out_features, 0.0, INIT_STDDEV),
                true,
            ),
            bias: Tensor::from_vec(vec![0.0; out_features], true),
            in_features,
            out_features,
        }
    }

    pub fn forward(&self, x: &Tensor, batch: usize) -> Tensor {
        let y = matmul(x, &self.weight, batch, self.in_features, self.out_features);
        add_bias(&y, &self.bias, batch, self.out_features)
    }

    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }

    /// Named tensors for checkpointing, sharing storage with the layer.
    pub fn state(&self, prefix: &str) -> Vec<(String, Tensor)> {
        vec![
            (format!("{prefix}.weight"), self.weight.clone()),
            (format!("{prefix}.bias"), self.bias.clone()),
        ]
    }
}
