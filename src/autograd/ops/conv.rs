//! 2-D convolution and transposed convolution (NHWC, SAME padding)
//!
//! One geometry describes a strided SAME convolution from a larger spatial
//! extent to `ceil(in/stride)`. [`conv2d`] applies it; [`conv2d_transpose`]
//! applies its adjoint, which serves both as the generator's upsampling layer
//! and as the backprop-to-input map the gradient penalty is built from. The
//! three raw kernels below are shared by both ops' forward and backward
//! passes.
//!
//! Weight layout is `[ky, kx, in_c, out_c]` flattened row-major, with
//! `in_c`/`out_c` named from the convolution's perspective.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Geometry of a SAME-padded strided convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeom {
    pub batch: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub in_c: usize,
    pub out_c: usize,
    pub kernel: usize,
    pub stride: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
}

impl ConvGeom {
    /// SAME geometry: output spatial extent is `ceil(in/stride)`, padding
    /// split with the smaller half leading.
    pub fn same(
        batch: usize,
        in_h: usize,
        in_w: usize,
        in_c: usize,
        out_c: usize,
        kernel: usize,
        stride: usize,
    ) -> Self {
        assert!(stride >= 1 && kernel >= 1, "degenerate conv geometry");
        let out_h = in_h.div_ceil(stride);
        let out_w = in_w.div_ceil(stride);
        let pad_h = ((out_h - 1) * stride + kernel).saturating_sub(in_h);
        let pad_w = ((out_w - 1) * stride + kernel).saturating_sub(in_w);
        Self {
            batch,
            in_h,
            in_w,
            in_c,
            out_c,
            kernel,
            stride,
            out_h,
            out_w,
            pad_top: pad_h / 2,
            pad_left: pad_w / 2,
        }
    }

    #[must_use]
    pub fn input_len(&self) -> usize {
        self.batch * self.in_h * self.in_w * self.in_c
    }

    #[must_use]
    pub fn output_len(&self) -> usize {
        self.batch * self.out_h * self.out_w * self.out_c
    }

    #[must_use]
    pub fn weight_len(&self) -> usize {
        self.kernel * self.kernel * self.in_c * self.out_c
    }
}

/// y[b, oy, ox, oc] = sum over (ky, kx, ic) of x[b, iy, ix, ic] * w[ky, kx, ic, oc]
/// with iy = oy*stride + ky - pad_top (out-of-bounds taps read zero).
pub fn conv_forward_raw(x: &[f32], w: &[f32], g: &ConvGeom) -> Vec<f32> {
    let mut out = vec![0.0f32; g.output_len()];
    for b in 0..g.batch {
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                let out_base = ((b * g.out_h + oy) * g.out_w + ox) * g.out_c;
                for ky in 0..g.kernel {
                    let iy = (oy * g.stride + ky) as isize - g.pad_top as isize;
                    if iy < 0 || iy >= g.in_h as isize {
                        continue;
                    }
                    for kx in 0..g.kernel {
                        let ix = (ox * g.stride + kx) as isize - g.pad_left as isize;
                        if ix < 0 || ix >= g.in_w as isize {
                            continue;
                        }
                        let x_base =
                            ((b * g.in_h + iy as usize) * g.in_w + ix as usize) * g.in_c;
                        let w_base = ((ky * g.kernel + kx) * g.in_c) * g.out_c;
                        for ic in 0..g.in_c {
                            let x_val = x[x_base + ic];
                            if x_val == 0.0 {
                                continue;
                            }
                            let w_row = &w[w_base + ic * g.out_c..w_base + (ic + 1) * g.out_c];
                            let out_row = &mut out[out_base..out_base + g.out_c];
                            for oc in 0..g.out_c {
                                out_row[oc] += x_val * w_row[oc];
                            }
                        }
                    }
                }
            }
        }
    }
    out
}

/// Adjoint of [`conv_forward_raw`] in its input: scatters an output-shaped
/// buffer back through the weights to an input-shaped buffer.
pub fn conv_input_raw(gout: &[f32], w: &[f32], g: &ConvGeom) -> Vec<f32> {
    let mut gx = vec![0.0f32; g.input_len()];
    for b in 0..g.batch {
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                let out_base = ((b * g.out_h + oy) * g.out_w + ox) * g.out_c;
                for ky in 0..g.kernel {
                    let iy = (oy * g.stride + ky) as isize - g.pad_top as isize;
                    if iy < 0 || iy >= g.in_h as isize {
                        continue;
                    }
                    for kx in 0..g.kernel {
                        let ix = (ox * g.stride + kx) as isize - g.pad_left as isize;
                        if ix < 0 || ix >= g.in_w as isize {
                            continue;
                        }
                        let x_base =
                            ((b * g.in_h + iy as usize) * g.in_w + ix as usize) * g.in_c;
                        let w_base = ((ky * g.kernel + kx) * g.in_c) * g.out_c;
                        for ic in 0..g.in_c {
                            let w_row = &w[w_base + ic * g.out_c..w_base + (ic + 1) * g.out_c];
                            let mut acc = 0.0f32;
                            for oc in 0..g.out_c {
                                acc += gout[out_base + oc] * w_row[oc];
                            }
                            gx[x_base + ic] += acc;
                        }
                    }
                }
            }
        }
    }
    gx
}

/// Weight gradient of [`conv_forward_raw`]: correlates an input-shaped buffer
/// with an output-shaped buffer.
pub fn conv_weight_raw(x: &[f32], gout: &[f32], g: &ConvGeom) -> Vec<f32> {
    let mut gw = vec![0.0f32; g.weight_len()];
    for b in 0..g.batch {
        for oy in 0..g.out_h {
            for ox in 0..g.out_w {
                let out_base = ((b * g.out_h + oy) * g.out_w + ox) * g.out_c;
                for ky in 0..g.kernel {
                    let iy = (oy * g.stride + ky) as isize - g.pad_top as isize;
                    if iy < 0 || iy >= g.in_h as isize {
                        continue;
                    }
                    for kx in 0..g.kernel {
                        let ix = (ox * g.stride + kx) as isize - g.pad_left as isize;
                        if ix < 0 || ix >= g.in_w as isize {
                            continue;
                        }
                        let x_base =
                            ((b * g.in_h + iy as usize) * g.in_w + ix as usize) * g.in_c;
                        let w_base = ((ky * g.kernel + kx) * g.in_c) * g.out_c;
                        for ic in 0..g.in_c {
                            let x_val = x[x_base + ic];
                            if x_val == 0.0 {
                                continue;
                            }
                            let gw_row =
                                &mut gw[w_base + ic * g.out_c..w_base + (ic + 1) * g.out_c];
                            for oc in 0..g.out_c {
                                gw_row[oc] += x_val * gout[out_base + oc];
                            }
                        }
                    }
                }
            }
        }
    }
    gw
}

fn add_channel_bias(buf: &mut [f32], bias: &Array1<f32>, channels: usize) {
    for (i, v) in buf.iter_mut().enumerate() {
        *v += bias[i % channels];
    }
}

fn channel_bias_grad(gout: &[f32], channels: usize) -> Array1<f32> {
    let mut gb = Array1::zeros(channels);
    for (i, &v) in gout.iter().enumerate() {
        gb[i % channels] += v;
    }
    gb
}

/// Strided SAME convolution with optional per-output-channel bias.
pub fn conv2d(x: &Tensor, w: &Tensor, bias: Option<&Tensor>, geom: ConvGeom) -> Tensor {
    assert_eq!(x.len(), geom.input_len(), "conv2d input size mismatch");
    assert_eq!(w.len(), geom.weight_len(), "conv2d weight size mismatch");

    let mut out = conv_forward_raw(
        x.data().as_slice().expect("input must be contiguous"),
        w.data().as_slice().expect("weights must be contiguous"),
        &geom,
    );
    if let Some(b) = bias {
        assert_eq!(b.len(), geom.out_c, "conv2d bias size mismatch");
        add_channel_bias(&mut out, &b.data(), geom.out_c);
    }

    let requires_grad = x.requires_grad()
        || w.requires_grad()
        || bias.is_some_and(Tensor::requires_grad);
    let mut result = Tensor::new(Array1::from(out), requires_grad);
    if requires_grad {
        let op = Rc::new(Conv2dBackward {
            x: x.clone(),
            w: w.clone(),
            bias: bias.cloned(),
            geom,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct Conv2dBackward {
    x: Tensor,
    w: Tensor,
    bias: Option<Tensor>,
    geom: ConvGeom,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for Conv2dBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let gout = grad.as_slice().expect("gradient must be contiguous");
            if self.x.requires_grad() {
                let gx = conv_input_raw(
                    gout,
                    self.w.data().as_slice().expect("weights must be contiguous"),
                    &self.geom,
                );
                self.x.accumulate_grad(Array1::from(gx));
            }
            if self.w.requires_grad() {
                let gw = conv_weight_raw(
                    self.x.data().as_slice().expect("input must be contiguous"),
                    gout,
                    &self.geom,
                );
                self.w.accumulate_grad(Array1::from(gw));
            }
            if let Some(b) = &self.bias {
                if b.requires_grad() {
                    b.accumulate_grad(channel_bias_grad(gout, self.geom.out_c));
                }
            }
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
            if let Some(op) = self.w.backward_op() {
                op.backward();
            }
            if let Some(op) = self.bias.as_ref().and_then(Tensor::backward_op) {
                op.backward();
            }
        }
    }
}

/// Transposed convolution: the adjoint of [`conv2d`] for the same geometry.
///
/// Input lives in the geometry's output space (`out_h x out_w x out_c`);
/// the result lives in its input space (`in_h x in_w x in_c`), with bias per
/// `in_c` channel. Doubles spatial resolution for stride 2.
pub fn conv2d_transpose(x: &Tensor, w: &Tensor, bias: Option<&Tensor>, geom: ConvGeom) -> Tensor {
    assert_eq!(x.len(), geom.output_len(), "conv2d_transpose input size mismatch");
    assert_eq!(w.len(), geom.weight_len(), "conv2d_transpose weight size mismatch");

    let mut out = conv_input_raw(
        x.data().as_slice().expect("input must be contiguous"),
        w.data().as_slice().expect("weights must be contiguous"),
        &geom,
    );
    if let Some(b) = bias {
        assert_eq!(b.len(), geom.in_c, "conv2d_transpose bias size mismatch");
        add_channel_bias(&mut out, &b.data(), geom.in_c);
    }

    let requires_grad = x.requires_grad()
        || w.requires_grad()
        || bias.is_some_and(Tensor::requires_grad);
    let mut result = Tensor::new(Array1::from(out), requires_grad);
    if requires_grad {
        let op = Rc::new(ConvTransposeBackward {
            x: x.clone(),
            w: w.clone(),
            bias: bias.cloned(),
            geom,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct ConvTransposeBackward {
    x: Tensor,
    w: Tensor,
    bias: Option<Tensor>,
    geom: ConvGeom,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ConvTransposeBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let gout = grad.as_slice().expect("gradient must be contiguous");
            if self.x.requires_grad() {
                // adjoint of the adjoint is the forward map
                let gx = conv_forward_raw(
                    gout,
                    self.w.data().as_slice().expect("weights must be contiguous"),
                    &self.geom,
                );
                self.x.accumulate_grad(Array1::from(gx));
            }
            if self.w.requires_grad() {
                let gw = conv_weight_raw(
                    gout,
                    self.x.data().as_slice().expect("input must be contiguous"),
                    &self.geom,
                );
                self.w.accumulate_grad(Array1::from(gw));
            }
            if let Some(b) = &self.bias {
                if b.requires_grad() {
                    b.accumulate_grad(channel_bias_grad(gout, self.geom.in_c));
                }
            }
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
            if let Some(op) = self.w.backward_op() {
                op.backward();
            }
            if let Some(op) = self.bias.as_ref().and_then(Tensor::backward_op) {
                op.backward();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;

    fn fill(len: usize, f: impl Fn(usize) -> f32) -> Vec<f32> {
        (0..len).map(f).collect()
    }

    #[test]
    fn test_same_geometry_even() {
        let g = ConvGeom::same(1, 64, 64, 3, 8, 5, 2);
        assert_eq!((g.out_h, g.out_w), (32, 32));
        // total pad = (32-1)*2 + 5 - 64 = 3 -> top 1, bottom 2
        assert_eq!(g.pad_top, 1);
    }

    #[test]
    fn test_same_geometry_odd() {
        let g = ConvGeom::same(1, 7, 7, 1, 1, 5, 2);
        assert_eq!((g.out_h, g.out_w), (4, 4));
    }

    #[test]
    fn test_same_geometry_unit_spatial() {
        let g = ConvGeom::same(2, 1, 1, 4, 8, 5, 2);
        assert_eq!((g.out_h, g.out_w), (1, 1));
    }

    #[test]
    fn test_conv_1x1_kernel_is_channel_mix() {
        // 1x1 kernel, stride 1: every pixel is an independent matmul over channels
        let g = ConvGeom::same(1, 2, 2, 2, 3, 1, 1);
        let x = fill(g.input_len(), |i| i as f32);
        let w = fill(g.weight_len(), |i| (i as f32) * 0.5);
        let out = conv_forward_raw(&x, &w, &g);
        // pixel 0 channels [0,1]; w rows [[0,0.5,1],[1.5,2,2.5]]
        assert!((out[0] - (0.0 * 0.0 + 1.0 * 1.5)).abs() < 1e-6);
        assert!((out[1] - (0.0 * 0.5 + 1.0 * 2.0)).abs() < 1e-6);
        assert!((out[2] - (0.0 * 1.0 + 1.0 * 2.5)).abs() < 1e-6);
    }

    #[test]
    fn test_adjoint_identity() {
        // <Conv(u), v> == <u, ConvT(v)> over random-ish buffers
        let g = ConvGeom::same(2, 5, 4, 3, 2, 3, 2);
        let u = fill(g.input_len(), |i| ((i * 7 % 13) as f32 - 6.0) * 0.25);
        let v = fill(g.output_len(), |i| ((i * 5 % 11) as f32 - 5.0) * 0.5);
        let w = fill(g.weight_len(), |i| ((i * 3 % 7) as f32 - 3.0) * 0.1);

        let conv_u = conv_forward_raw(&u, &w, &g);
        let convt_v = conv_input_raw(&v, &w, &g);

        let lhs: f32 = conv_u.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
        let rhs: f32 = u.iter().zip(convt_v.iter()).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-3, "adjoint mismatch: {lhs} vs {rhs}");
    }

    #[test]
    fn test_conv2d_gradcheck_finite_difference() {
        let g = ConvGeom::same(1, 4, 4, 2, 2, 3, 2);
        let x_data = fill(g.input_len(), |i| ((i % 5) as f32 - 2.0) * 0.3);
        let w_data = fill(g.weight_len(), |i| ((i % 7) as f32 - 3.0) * 0.1);
        let b_data = fill(g.out_c, |i| i as f32 * 0.05);

        let loss_at = |xd: &[f32], wd: &[f32], bd: &[f32]| -> f32 {
            let mut out = conv_forward_raw(xd, wd, &g);
            add_channel_bias(&mut out, &Array1::from(bd.to_vec()), g.out_c);
            out.iter().sum()
        };

        let x = Tensor::from_vec(x_data.clone(), true);
        let w = Tensor::from_vec(w_data.clone(), true);
        let b = Tensor::from_vec(b_data.clone(), true);
        let mut y = conv2d(&x, &w, Some(&b), g);
        backward(&mut y, Some(Array1::ones(g.output_len())));

        let eps = 1e-2f32;
        let gx = x.grad().unwrap();
        for i in [0, 3, 11, g.input_len() - 1] {
            let mut xp = x_data.clone();
            xp[i] += eps;
            let mut xm = x_data.clone();
            xm[i] -= eps;
            let fd = (loss_at(&xp, &w_data, &b_data) - loss_at(&xm, &w_data, &b_data)) / (2.0 * eps);
            assert!((gx[i] - fd).abs() < 1e-2, "x grad[{i}]: {} vs fd {}", gx[i], fd);
        }

        let gw = w.grad().unwrap();
        for i in [0, 5, g.weight_len() - 1] {
            let mut wp = w_data.clone();
            wp[i] += eps;
            let mut wm = w_data.clone();
            wm[i] -= eps;
            let fd = (loss_at(&x_data, &wp, &b_data) - loss_at(&x_data, &wm, &b_data)) / (2.0 * eps);
            assert!((gw[i] - fd).abs() < 1e-2, "w grad[{i}]: {} vs fd {}", gw[i], fd);
        }

        let gb = b.grad().unwrap();
        // bias grad for an all-ones seed is the number of output pixels
        let pixels = (g.batch * g.out_h * g.out_w) as f32;
        for oc in 0..g.out_c {
            assert!((gb[oc] - pixels).abs() < 1e-4);
        }
    }

    #[test]
    fn test_conv2d_transpose_shape_doubles() {
        let g = ConvGeom::same(1, 8, 8, 4, 16, 5, 2);
        let x = Tensor::from_vec(fill(g.output_len(), |i| i as f32 * 0.01), false);
        let w = Tensor::from_vec(fill(g.weight_len(), |i| i as f32 * 0.001), false);
        let y = conv2d_transpose(&x, &w, None, g);
        assert_eq!(y.len(), g.input_len());
    }

    #[test]
    fn test_conv2d_transpose_gradcheck() {
        let g = ConvGeom::same(1, 4, 4, 2, 3, 3, 2);
        let x_data = fill(g.output_len(), |i| ((i % 4) as f32 - 1.5) * 0.4);
        let w_data = fill(g.weight_len(), |i| ((i % 6) as f32 - 2.0) * 0.15);

        let loss_at = |xd: &[f32], wd: &[f32]| -> f32 {
            conv_input_raw(xd, wd, &g).iter().sum()
        };

        let x = Tensor::from_vec(x_data.clone(), true);
        let w = Tensor::from_vec(w_data.clone(), true);
        let mut y = conv2d_transpose(&x, &w, None, g);
        backward(&mut y, Some(Array1::ones(g.input_len())));

        let eps = 1e-2f32;
        let gx = x.grad().unwrap();
        for i in [0, 7, g.output_len() - 1] {
            let mut xp = x_data.clone();
            xp[i] += eps;
            let mut xm = x_data.clone();
            xm[i] -= eps;
            let fd = (loss_at(&xp, &w_data) - loss_at(&xm, &w_data)) / (2.0 * eps);
            assert!((gx[i] - fd).abs() < 1e-2, "x grad[{i}]: {} vs fd {}", gx[i], fd);
        }

        let gw = w.grad().unwrap();
        for i in [1, g.weight_len() / 2, g.weight_len() - 1] {
            let mut wp = w_data.clone();
            wp[i] += eps;
            let mut wm = w_data.clone();
            wm[i] -= eps;
            let fd = (loss_at(&x_data, &wp) - loss_at(&x_data, &wm)) / (2.0 * eps);
            assert!((gw[i] - fd).abs() < 1e-2, "w grad[{i}]: {} vs fd {}", gw[i], fd);
        }
    }

    #[test]
    fn test_conv_weight_raw_matches_manual_1x1() {
        let g = ConvGeom::same(1, 1, 1, 2, 2, 1, 1);
        let x = vec![2.0, 3.0];
        let gout = vec![1.0, 10.0];
        let gw = conv_weight_raw(&x, &gout, &g);
        // w[ic][oc] grad = x[ic] * gout[oc]
        assert_eq!(gw, vec![2.0, 20.0, 3.0, 30.0]);
    }
}
