//! Convolution layers (NHWC)

use crate::autograd::ops::{conv2d, conv2d_transpose, ConvGeom};
use crate::autograd::Tensor;
use crate::nn::init::{gaussian_vec, INIT_STDDEV};
use rand::Rng;

/// Strided SAME convolution with a per-output-channel bias. Spatial extent
/// halves (rounding up) at stride 2.
pub struct Conv2d {
    pub weight: Tensor,
    pub bias: Tensor,
    in_c: usize,
    out_c: usize,
    kernel: usize,
    stride: usize,
}

impl Conv2d {
    pub fn new<R: Rng>(rng: &mut R, in_c: usize, out_c: usize, kernel: usize, stride: usize) -> Self {
        Self {
            weight: Tensor::from_vec(
                gaussian_vec(rng, kernel * kernel * in_c * out_c, 0.0, INIT_STDDEV),
                true,
            ),
            bias: Tensor::from_vec(vec![0.0; out_c], true),
            in_c,
            out_c,
            kernel,
            stride,
        }
    }

    /// Geometry this layer applies over a `[batch, in_h, in_w, in_c]` input.
    pub fn geom(&self, batch: usize, in_h: usize, in_w: usize) -> ConvGeom {
        ConvGeom::same(batch, in_h, in_w, self.in_c, self.out_c, self.kernel, self.stride)
    }

    pub fn forward(&self, x: &Tensor, batch: usize, in_h: usize, in_w: usize) -> Tensor {
        conv2d(x, &self.weight, Some(&self.bias), self.geom(batch, in_h, in_w))
    }

    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.out_c
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

/// Fractionally-strided (transposed) convolution with per-output-channel
/// bias. The caller names the target spatial extent; the input must sit at
/// `ceil(target/stride)`, mirroring the strided convolution it inverts.
///
/// The weight is stored as `[kernel, kernel, out_c, in_c]`, the layout of
/// the SAME convolution running in the opposite direction.
pub struct Deconv2d {
    pub weight: Tensor,
    pub bias: Tensor,
    in_c: usize,
    out_c: usize,
    kernel: usize,
    stride: usize,
}

impl Deconv2d {
    pub fn new<R: Rng>(rng: &mut R, in_c: usize, out_c: usize, kernel: usize, stride: usize) -> Self {
        Self {
            weight: Tensor::from_vec(
                gaussian_vec(rng, kernel * kernel * out_c * in_c, 0.0, INIT_STDDEV),
                true,
            ),
            bias: Tensor::from_vec(vec![0.0; out_c], true),
            in_c,
            out_c,
            kernel,
            stride,
        }
    }

    /// Geometry of the opposite-direction convolution, defined over the
    /// larger `[batch, out_h, out_w, out_c]` extent.
    pub fn geom(&self, batch: usize, out_h: usize, out_w: usize) -> ConvGeom {
        ConvGeom::same(batch, out_h, out_w, self.out_c, self.in_c, self.kernel, self.stride)
    }

    pub fn forward(&self, x: &Tensor, batch: usize, out_h: usize, out_w: usize) -> Tensor {
        let geom = self.geom(batch, out_h, out_w);
        debug_assert_eq!(x.len(), geom.output_len(), "deconv input extent mismatch");
        conv2d_transpose(x, &self.weight, Some(&self.bias), geom)
    }

    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.out_c
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
