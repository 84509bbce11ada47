//! Batch normalization layer with running statistics

use crate::autograd::ops::{batch_norm_eval, batch_norm_train, BatchStats};
use crate::autograd::Tensor;
use crate::nn::init::{gaussian_vec, INIT_STDDEV};
use rand::Rng;

pub const BN_MOMENTUM: f32 = 0.9;
pub const BN_EPSILON: f32 = 1e-5;

/// Per-channel batch norm over channels-last buffers. Training passes
/// normalize with batch moments and fold them into the running averages
/// (`moving = moving * 0.9 + batch * 0.1`); inference passes normalize with
/// the accumulated averages only.
///
/// The running statistics ride along as non-differentiable tensors so they
/// persist with the rest of the layer state.
pub struct BatchNorm {
    pub gamma: Tensor,
    pub beta: Tensor,
    pub running_mean: Tensor,
    pub running_var: Tensor,
    channels: usize,
}

impl BatchNorm {
    /// Scale starts near one (`N(1, 0.02)`), shift at zero.
    pub fn new<R: Rng>(rng: &mut R, channels: usize) -> Self {
        Self {
            gamma: Tensor::from_vec(gaussian_vec(rng, channels, 1.0, INIT_STDDEV), true),
            beta: Tensor::from_vec(vec![0.0; channels], true),
            running_mean: Tensor::from_vec(vec![0.0; channels], false),
            running_var: Tensor::from_vec(vec![1.0; channels], false),
            channels,
        }
    }

    pub fn forward_train(&self, x: &Tensor, rows: usize) -> Tensor {
        self.forward_train_stats(x, rows).0
    }

    /// Training pass that also hands back the captured batch statistics.
    pub fn forward_train_stats(&self, x: &Tensor, rows: usize) -> (Tensor, BatchStats) {
        let (y, stats) =
            batch_norm_train(x, &self.gamma, &self.beta, rows, self.channels, BN_EPSILON);
        {
            let mut m = self.running_mean.data_mut();
            let mut v = self.running_var.data_mut();
            for c in 0..self.channels {
                m[c] = m[c] * BN_MOMENTUM + stats.mean[c] * (1.0 - BN_MOMENTUM);
                v[c] = v[c] * BN_MOMENTUM + stats.var[c] * (1.0 - BN_MOMENTUM);
            }
        }
        (y, stats)
    }

    pub fn forward_eval(&self, x: &Tensor, rows: usize) -> Tensor {
        let mean = self.running_mean.data().clone();
        let var = self.running_var.data().clone();
        batch_norm_eval(
            x,
            &self.gamma,
            &self.beta,
            &mean,
            &var,
            rows,
            self.channels,
            BN_EPSILON,
        )
    }

    pub fn forward(&self, x: &Tensor, rows: usize, train: bool) -> Tensor {
        if train {
            self.forward_train(x, rows)
        } else {
            self.forward_eval(x, rows)
        }
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.gamma, &self.beta]
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.gamma, &mut self.beta]
    }

    /// Named tensors for checkpointing, running statistics included.
    /// Returned tensors share storage with the layer.
    pub fn state(&self, prefix: &str) -> Vec<(String, Tensor)> {
        vec![
            (format!("{prefix}.gamma"), self.gamma.clone()),
            (format!("{prefix}.beta"), self.beta.clone()),
            (format!("{prefix}.moving_mean"), self.running_mean.clone()),
            (format!("{prefix}.moving_variance"), self.running_var.clone()),
        ]
    }
}
