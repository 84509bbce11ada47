//! Conditional discriminator network and its input-gradient expression.

use ndarray::Array1;

use crate::autograd::ops::{
    bn_input_grad, concat_channels, conv2d_transpose, leaky_relu, leaky_relu_mask, matmul,
    mul_const, slice_channels, tile_spatial, transpose_matrix, BatchStats, ConvGeom,
};
use crate::autograd::Tensor;
use crate::nn::{BatchNorm, Conv2d, Linear};
use rand::Rng;

use super::config::ModelConfig;
use super::embedding::TagProjector;
use super::LRELU_SLOPE;

/// Image + tag vector to a single unbounded score per example.
///
/// Four strided convolutions shrink the image to the deepest extent, the
/// projected tag embedding is tiled over that extent and fused through a
/// one-by-one convolution, and a final linear map reads the score. Every
/// pass runs with per-batch normalization statistics, matching the single
/// training graph the model is built around.
pub struct Discriminator {
    pub embedding: TagProjector,
    pub conv0: Conv2d,
    pub conv1: Conv2d,
    pub bn1: BatchNorm,
    pub conv2: Conv2d,
    pub bn2: BatchNorm,
    pub conv3: Conv2d,
    pub bn3: BatchNorm,
    pub conv_fuse: Conv2d,
    pub bn4: BatchNorm,
    pub h4_lin: Linear,
    config: ModelConfig,
}

/// Per-layer values captured by a scoring pass, enough to rebuild the
/// score's gradient with respect to the image as a differentiable
/// expression. Rectifier masks and normalization statistics are held as
/// constants of that expression.
pub struct DiscriminatorTrace {
    batch: usize,
    geom0: ConvGeom,
    geom1: ConvGeom,
    geom2: ConvGeom,
    geom3: ConvGeom,
    geom_fuse: ConvGeom,
    mask0: Array1<f32>,
    mask1: Array1<f32>,
    mask2: Array1<f32>,
    mask3: Array1<f32>,
    mask_fuse: Array1<f32>,
    stats1: BatchStats,
    stats2: BatchStats,
    stats3: BatchStats,
    stats_fuse: BatchStats,
}

impl Discriminator {
    pub fn new<R: Rng>(rng: &mut R, config: &ModelConfig) -> Self {
        let chain = config.spatial_chain();
        let (s16_h, s16_w) = chain.s16;
        let df = config.df_dim;

        Self {
            embedding: TagProjector::new(rng, config.y_dim, config.t_dim),
            conv0: Conv2d::new(rng, config.c_dim, df, 5, 2),
            conv1: Conv2d::new(rng, df, df * 2, 5, 2),
            bn1: BatchNorm::new(rng, df * 2),
            conv2: Conv2d::new(rng, df * 2, df * 4, 5, 2),
            bn2: BatchNorm::new(rng, df * 4),
            conv3: Conv2d::new(rng, df * 4, df * 8, 5, 2),
            bn3: BatchNorm::new(rng, df * 8),
            conv_fuse: Conv2d::new(rng, df * 8 + config.t_dim, df * 8, 1, 1),
            bn4: BatchNorm::new(rng, df * 8),
            h4_lin: Linear::new(rng, df * 8 * s16_h * s16_w, 1),
            config: config.clone(),
        }
    }

    /// Scores a batch of images under their tag vectors. Returns one raw
    /// score per example; the objective decides whether to squash it.
    pub fn score(&self, x: &Tensor, tags: &Tensor, batch: usize) -> Tensor {
        self.run(x, tags, batch).0
    }

    /// Scores a batch while capturing the layer values needed by
    /// [`Discriminator::input_gradient`].
    pub fn score_with_trace(
        &self,
        x: &Tensor,
        tags: &Tensor,
        batch: usize,
    ) -> (Tensor, DiscriminatorTrace) {
        self.run(x, tags, batch)
    }

    fn run(&self, x: &Tensor, tags: &Tensor, batch: usize) -> (Tensor, DiscriminatorTrace) {
        let chain = self.config.spatial_chain();
        let df = self.config.df_dim;
        let rows2 = batch * chain.s2.0 * chain.s2.1;
        let rows4 = batch * chain.s4.0 * chain.s4.1;
        let rows8 = batch * chain.s8.0 * chain.s8.1;
        let rows16 = batch * chain.s16.0 * chain.s16.1;

        let pre0 = self.conv0.forward(x, batch, chain.s.0, chain.s.1);
        let mask0 = leaky_relu_mask(&pre0.data(), LRELU_SLOPE);
        let h0 = leaky_relu(&pre0, LRELU_SLOPE);
        debug_assert_eq!(h0.len(), rows2 * df);

        let c1 = self.conv1.forward(&h0, batch, chain.s2.0, chain.s2.1);
        let (b1, stats1) = self.bn1.forward_train_stats(&c1, rows4);
        let mask1 = leaky_relu_mask(&b1.data(), LRELU_SLOPE);
        let h1 = leaky_relu(&b1, LRELU_SLOPE);

        let c2 = self.conv2.forward(&h1, batch, chain.s4.0, chain.s4.1);
        let (b2, stats2) = self.bn2.forward_train_stats(&c2, rows8);
        let mask2 = leaky_relu_mask(&b2.data(), LRELU_SLOPE);
        let h2 = leaky_relu(&b2, LRELU_SLOPE);

        let c3 = self.conv3.forward(&h2, batch, chain.s8.0, chain.s8.1);
        let (b3, stats3) = self.bn3.forward_train_stats(&c3, rows16);
        let mask3 = leaky_relu_mask(&b3.data(), LRELU_SLOPE);
        let h3 = leaky_relu(&b3, LRELU_SLOPE);

        let emb = self.embedding.forward(tags, batch);
        let tiled = tile_spatial(&emb, batch, self.config.t_dim, chain.s16.0, chain.s16.1);
        let cat = concat_channels(&h3, &tiled, rows16, df * 8, self.config.t_dim);

        let cf = self.conv_fuse.forward(&cat, batch, chain.s16.0, chain.s16.1);
        let (b4, stats_fuse) = self.bn4.forward_train_stats(&cf, rows16);
        let mask_fuse = leaky_relu_mask(&b4.data(), LRELU_SLOPE);
        let h4 = leaky_relu(&b4, LRELU_SLOPE);

        let score = self.h4_lin.forward(&h4, batch);

        let trace = DiscriminatorTrace {
            batch,
            geom0: self.conv0.geom(batch, chain.s.0, chain.s.1),
            geom1: self.conv1.geom(batch, chain.s2.0, chain.s2.1),
            geom2: self.conv2.geom(batch, chain.s4.0, chain.s4.1),
            geom3: self.conv3.geom(batch, chain.s8.0, chain.s8.1),
            geom_fuse: self.conv_fuse.geom(batch, chain.s16.0, chain.s16.1),
            mask0,
            mask1,
            mask2,
            mask3,
            mask_fuse,
            stats1,
            stats2,
            stats3,
            stats_fuse,
        };
        (score, trace)
    }

    /// Gradient of the summed score with respect to the scored images, built
    /// as a differentiable expression over the network parameters so a
    /// penalty on it can push gradients back into them.
    ///
    /// The expression walks the scoring pass in reverse: the linear layer
    /// seeds each example with its weight row, rectifiers contribute their
    /// captured masks, normalization contributes its exact input-gradient
    /// map, and each convolution is crossed by its transpose. The embedding
    /// branch is cut after the fusing convolution since the penalty only
    /// concerns the image input.
    pub fn input_gradient(&self, trace: &DiscriminatorTrace) -> Tensor {
        let chain = self.config.spatial_chain();
        let df = self.config.df_dim;
        let batch = trace.batch;
        let rows4 = batch * chain.s4.0 * chain.s4.1;
        let rows8 = batch * chain.s8.0 * chain.s8.1;
        let rows16 = batch * chain.s16.0 * chain.s16.1;
        let features = df * 8 * chain.s16.0 * chain.s16.1;

        let ones = Tensor::from_vec(vec![1.0; batch], false);
        let w_row = transpose_matrix(&self.h4_lin.weight, features, 1);
        let g = matmul(&ones, &w_row, batch, 1, features);

        let g = mul_const(&g, &trace.mask_fuse);
        let g = bn_input_grad(
            &g,
            &self.bn4.gamma,
            &trace.stats_fuse.normalized,
            &trace.stats_fuse.inv_std,
            rows16,
            df * 8,
        );
        let g = conv2d_transpose(&g, &self.conv_fuse.weight, None, trace.geom_fuse);
        let g = slice_channels(&g, rows16, df * 8 + self.config.t_dim, 0, df * 8);

        let g = mul_const(&g, &trace.mask3);
        let g = bn_input_grad(
            &g,
            &self.bn3.gamma,
            &trace.stats3.normalized,
            &trace.stats3.inv_std,
            rows16,
            df * 8,
        );
        let g = conv2d_transpose(&g, &self.conv3.weight, None, trace.geom3);

        let g = mul_const(&g, &trace.mask2);
        let g = bn_input_grad(
            &g,
            &self.bn2.gamma,
            &trace.stats2.normalized,
            &trace.stats2.inv_std,
            rows8,
            df * 4,
        );
        let g = conv2d_transpose(&g, &self.conv2.weight, None, trace.geom2);

        let g = mul_const(&g, &trace.mask1);
        let g = bn_input_grad(
            &g,
            &self.bn1.gamma,
            &trace.stats1.normalized,
            &trace.stats1.inv_std,
            rows4,
            df * 2,
        );
        let g = conv2d_transpose(&g, &self.conv1.weight, None, trace.geom1);

        let g = mul_const(&g, &trace.mask0);
        conv2d_transpose(&g, &self.conv0.weight, None, trace.geom0)
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.embedding.parameters();
        params.extend(self.conv0.parameters());
        params.extend(self.conv1.parameters());
        params.extend(self.bn1.parameters());
        params.extend(self.conv2.parameters());
        params.extend(self.bn2.parameters());
        params.extend(self.conv3.parameters());
        params.extend(self.bn3.parameters());
        params.extend(self.conv_fuse.parameters());
        params.extend(self.bn4.parameters());
        params.extend(self.h4_lin.parameters());
        params
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.embedding.parameters_mut();
        params.extend(self.conv0.parameters_mut());
        params.extend(self.conv1.parameters_mut());
        params.extend(self.bn1.parameters_mut());
        params.extend(self.conv2.parameters_mut());
        params.extend(self.bn2.parameters_mut());
        params.extend(self.conv3.parameters_mut());
        params.extend(self.bn3.parameters_mut());
        params.extend(self.conv_fuse.parameters_mut());
        params.extend(self.bn4.parameters_mut());
        params.extend(self.h4_lin.parameters_mut());
        params
    }

    /// Every persistent tensor with its checkpoint name, running statistics
    /// included. Returned tensors share storage with the layers.
    pub fn state(&self) -> Vec<(String, Tensor)> {
        let mut state = self.embedding.state("d");
        state.extend(self.conv0.state("d_h0_conv"));
        state.extend(self.conv1.state("d_h1_conv"));
        state.extend(self.bn1.state("d_bn1"));
        state.extend(self.conv2.state("d_h2_conv"));
        state.extend(self.bn2.state("d_bn2"));
        state.extend(self.conv3.state("d_h3_conv"));
        state.extend(self.bn3.state("d_bn3"));
        state.extend(self.conv_fuse.state("d_fuse_conv"));
        state.extend(self.bn4.state("d_bn4"));
        state.extend(self.h4_lin.state("d_h4_lin"));
        state
    }
}
