//! Conditional generator network

use crate::autograd::ops::{concat_channels, relu, tanh_unit};
use crate::autograd::Tensor;
use crate::nn::{BatchNorm, Deconv2d, Linear};
use rand::Rng;

use super::config::ModelConfig;
use super::embedding::TagProjector;

/// Noise + tag embedding to an image in [0,1].
///
/// The projection target volume sits at the spatial extent reached by four
/// ceiling halvings of the output size; four fractionally-strided stages walk
/// back up, halving channel depth as they double extent, with the last stage
/// mapping to image channels unnormalized under a shifted tanh.
pub struct Generator {
    pub embedding: TagProjector,
    pub h0_lin: Linear,
    pub bn0: BatchNorm,
    pub h1: Deconv2d,
    pub bn1: BatchNorm,
    pub h2: Deconv2d,
    pub bn2: BatchNorm,
    pub h3: Deconv2d,
    pub bn3: BatchNorm,
    pub h4: Deconv2d,
    config: ModelConfig,
}

impl Generator {
    pub fn new<R: Rng>(rng: &mut R, config: &ModelConfig) -> Self {
        let chain = config.spatial_chain();
        let (s16_h, s16_w) = chain.s16;
        let gf = config.gf_dim;

        Self {
            embedding: TagProjector::new(rng, config.y_dim, config.t_dim),
            h0_lin: Linear::new(rng, config.z_dim + config.t_dim, gf * 8 * s16_h * s16_w),
            bn0: BatchNorm::new(rng, gf * 8),
            h1: Deconv2d::new(rng, gf * 8, gf * 4, 5, 2),
            bn1: BatchNorm::new(rng, gf * 4),
            h2: Deconv2d::new(rng, gf * 4, gf * 2, 5, 2),
            bn2: BatchNorm::new(rng, gf * 2),
            h3: Deconv2d::new(rng, gf * 2, gf, 5, 2),
            bn3: BatchNorm::new(rng, gf),
            h4: Deconv2d::new(rng, gf, config.c_dim, 5, 2),
            config: config.clone(),
        }
    }

    /// Training-mode forward: per-batch normalization statistics, gradients
    /// tracked through every stage.
    pub fn forward(&self, z: &Tensor, tags: &Tensor, batch: usize) -> Tensor {
        self.run(z, tags, batch, true)
    }

    /// Sampling entry point: running normalization statistics, detached
    /// output. Shares every parameter with [`Generator::forward`].
    pub fn sample(&self, z: &Tensor, tags: &Tensor, batch: usize) -> Tensor {
        self.run(z, tags, batch, false).detach()
    }

    fn run(&self, z: &Tensor, tags: &Tensor, batch: usize, train: bool) -> Tensor {
        let chain = self.config.spatial_chain();

        let emb = self.embedding.forward(tags, batch);
        let zy = concat_channels(z, &emb, batch, self.config.z_dim, self.config.t_dim);

        // The projected volume is already NHWC row-major per example
        let h0 = self.h0_lin.forward(&zy, batch);
        let rows16 = batch * chain.s16.0 * chain.s16.1;
        let h0 = relu(&self.bn0.forward(&h0, rows16, train));

        let h1 = self.h1.forward(&h0, batch, chain.s8.0, chain.s8.1);
        let rows8 = batch * chain.s8.0 * chain.s8.1;
        let h1 = relu(&self.bn1.forward(&h1, rows8, train));

        let h2 = self.h2.forward(&h1, batch, chain.s4.0, chain.s4.1);
        let rows4 = batch * chain.s4.0 * chain.s4.1;
        let h2 = relu(&self.bn2.forward(&h2, rows4, train));

        let h3 = self.h3.forward(&h2, batch, chain.s2.0, chain.s2.1);
        let rows2 = batch * chain.s2.0 * chain.s2.1;
        let h3 = relu(&self.bn3.forward(&h3, rows2, train));

        let h4 = self.h4.forward(&h3, batch, chain.s.0, chain.s.1);
        tanh_unit(&h4)
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.embedding.parameters();
        params.extend(self.h0_lin.parameters());
        params.extend(self.bn0.parameters());
        params.extend(self.h1.parameters());
        params.extend(self.bn1.parameters());
        params.extend(self.h2.parameters());
        params.extend(self.bn2.parameters());
        params.extend(self.h3.parameters());
        params.extend(self.bn3.parameters());
        params.extend(self.h4.parameters());
        params
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.embedding.parameters_mut();
        params.extend(self.h0_lin.parameters_mut());
        params.extend(self.bn0.parameters_mut());
        params.extend(self.h1.parameters_mut());
        params.extend(self.bn1.parameters_mut());
        params.extend(self.h2.parameters_mut());
        params.extend(self.bn2.parameters_mut());
        params.extend(self.h3.parameters_mut());
        params.extend(self.bn3.parameters_mut());
        params.extend(self.h4.parameters_mut());
        params
    }

    /// Every persistent tensor with its checkpoint name, running statistics
    /// included. Returned tensors share storage with the layers.
    pub fn state(&self) -> Vec<(String, Tensor)> {
        let mut state = self.embedding.state("g");
        state.extend(self.h0_lin.state("g_h0_lin"));
        state.extend(self.bn0.state("g_bn0"));
        state.extend(self.h1.state("g_h1"));
        state.extend(self.bn1.state("g_bn1"));
        state.extend(self.h2.state("g_h2"));
        state.extend(self.bn2.state("g_bn2"));
        state.extend(self.h3.state("g_h3"));
        state.extend(self.bn3.state("g_bn3"));
        state.extend(self.h4.state("g_h4"));
        state
    }
}
