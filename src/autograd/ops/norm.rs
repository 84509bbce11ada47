//! Batch normalization and per-channel autograd operations (NHWC)
//!
//! Buffers are treated as `rows x channels` with channels last, so a
//! `[batch, h, w, c]` feature map normalizes per channel over batch and
//! space with `rows = batch * h * w`.

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Per-channel statistics captured by a training-mode batch norm forward.
#[derive(Debug, Clone)]
pub struct BatchStats {
    pub mean: Array1<f32>,
    pub var: Array1<f32>,
    pub inv_std: Array1<f32>,
    pub normalized: Array1<f32>,
}

fn channel_moments(x: &Array1<f32>, rows: usize, channels: usize) -> (Array1<f32>, Array1<f32>) {
    let mut mean = Array1::zeros(channels);
    for r in 0..rows {
        for c in 0..channels {
            mean[c] += x[r * channels + c];
        }
    }
    mean /= rows as f32;
    let mut var = Array1::zeros(channels);
    for r in 0..rows {
        for c in 0..channels {
            let d = x[r * channels + c] - mean[c];
            var[c] += d * d;
        }
    }
    var /= rows as f32;
    (mean, var)
}

/// Training-mode batch norm: normalize with this batch's moments, then apply
/// the learned per-channel scale and shift. Returns the captured statistics
/// so the owning layer can update running averages.
pub fn batch_norm_train(
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    rows: usize,
    channels: usize,
    epsilon: f32,
) -> (Tensor, BatchStats) {
    assert_eq!(x.len(), rows * channels, "batch_norm input size mismatch");
    assert_eq!(gamma.len(), channels, "batch_norm gamma size mismatch");
    assert_eq!(beta.len(), channels, "batch_norm beta size mismatch");

    let x_data = x.data();
    let (mean, var) = channel_moments(&x_data, rows, channels);
    let inv_std = var.mapv(|v| 1.0 / (v + epsilon).sqrt());

    let mut normalized = Array1::zeros(rows * channels);
    let mut out = Array1::zeros(rows * channels);
    {
        let g = gamma.data();
        let b = beta.data();
        for r in 0..rows {
            for c in 0..channels {
                let idx = r * channels + c;
                let n = (x_data[idx] - mean[c]) * inv_std[c];
                normalized[idx] = n;
                out[idx] = g[c] * n + b[c];
            }
        }
    }
    drop(x_data);

    let stats = BatchStats {
        mean,
        var,
        inv_std: inv_std.clone(),
        normalized: normalized.clone(),
    };

    let requires_grad = x.requires_grad() || gamma.requires_grad() || beta.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(BatchNormTrainBackward {
            x: x.clone(),
            gamma: gamma.clone(),
            beta: beta.clone(),
            inv_std,
            normalized,
            rows,
            channels,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    (result, stats)
}

struct BatchNormTrainBackward {
    x: Tensor,
    gamma: Tensor,
    beta: Tensor,
    inv_std: Array1<f32>,
    normalized: Array1<f32>,
    rows: usize,
    channels: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for BatchNormTrainBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let rows = self.rows;
            let channels = self.channels;
            let n = rows as f32;

            if self.beta.requires_grad() {
                let mut gb = Array1::zeros(channels);
                for r in 0..rows {
                    for c in 0..channels {
                        gb[c] += grad[r * channels + c];
                    }
                }
                self.beta.accumulate_grad(gb);
            }
            if self.gamma.requires_grad() {
                let mut gg = Array1::zeros(channels);
                for r in 0..rows {
                    for c in 0..channels {
                        let idx = r * channels + c;
                        gg[c] += grad[idx] * self.normalized[idx];
                    }
                }
                self.gamma.accumulate_grad(gg);
            }
            if self.x.requires_grad() {
                // Per channel: dx = (gamma * inv_std) *
                //   (dy - mean(dy) - normalized * mean(dy * normalized))
                let gamma = self.gamma.data();
                let mut sum_g = Array1::<f32>::zeros(channels);
                let mut sum_gn = Array1::<f32>::zeros(channels);
                for r in 0..rows {
                    for c in 0..channels {
                        let idx = r * channels + c;
                        sum_g[c] += grad[idx];
                        sum_gn[c] += grad[idx] * self.normalized[idx];
                    }
                }
                let mut gx = Array1::zeros(rows * channels);
                for r in 0..rows {
                    for c in 0..channels {
                        let idx = r * channels + c;
                        let centered =
                            grad[idx] - sum_g[c] / n - self.normalized[idx] * sum_gn[c] / n;
                        gx[idx] = gamma[c] * self.inv_std[c] * centered;
                    }
                }
                self.x.accumulate_grad(gx);
            }

            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
            if let Some(op) = self.gamma.backward_op() {
                op.backward();
            }
            if let Some(op) = self.beta.backward_op() {
                op.backward();
            }
        }
    }
}

/// Inference-mode batch norm: normalize with accumulated running statistics.
/// A per-channel affine map; no batch coupling.
pub fn batch_norm_eval(
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    running_mean: &Array1<f32>,
    running_var: &Array1<f32>,
    rows: usize,
    channels: usize,
    epsilon: f32,
) -> Tensor {
    assert_eq!(x.len(), rows * channels, "batch_norm input size mismatch");
    let inv_std = running_var.mapv(|v| 1.0 / (v + epsilon).sqrt());
    let x_data = x.data();
    let g = gamma.data();
    let b = beta.data();
    let mut out = Array1::zeros(rows * channels);
    for r in 0..rows {
        for c in 0..channels {
            let idx = r * channels + c;
            out[idx] = g[c] * (x_data[idx] - running_mean[c]) * inv_std[c] + b[c];
        }
    }
    drop(x_data);
    drop(g);
    drop(b);

    let requires_grad = x.requires_grad() || gamma.requires_grad() || beta.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(BatchNormEvalBackward {
            x: x.clone(),
            gamma: gamma.clone(),
            beta: beta.clone(),
            running_mean: running_mean.clone(),
            inv_std,
            rows,
            channels,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct BatchNormEvalBackward {
    x: Tensor,
    gamma: Tensor,
    beta: Tensor,
    running_mean: Array1<f32>,
    inv_std: Array1<f32>,
    rows: usize,
    channels: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for BatchNormEvalBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let rows = self.rows;
            let channels = self.channels;
            if self.beta.requires_grad() {
                let mut gb = Array1::zeros(channels);
                for r in 0..rows {
                    for c in 0..channels {
                        gb[c] += grad[r * channels + c];
                    }
                }
                self.beta.accumulate_grad(gb);
            }
            if self.gamma.requires_grad() {
                let x_data = self.x.data();
                let mut gg = Array1::zeros(channels);
                for r in 0..rows {
                    for c in 0..channels {
                        let idx = r * channels + c;
                        gg[c] += grad[idx]
                            * (x_data[idx] - self.running_mean[c])
                            * self.inv_std[c];
                    }
                }
                self.gamma.accumulate_grad(gg);
            }
            if self.x.requires_grad() {
                let gamma = self.gamma.data();
                let mut gx = Array1::zeros(rows * channels);
                for r in 0..rows {
                    for c in 0..channels {
                        let idx = r * channels + c;
                        gx[idx] = grad[idx] * gamma[c] * self.inv_std[c];
                    }
                }
                self.x.accumulate_grad(gx);
            }
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
            if let Some(op) = self.gamma.backward_op() {
                op.backward();
            }
            if let Some(op) = self.beta.backward_op() {
                op.backward();
            }
        }
    }
}

fn bn_grad_formula(
    dy: &Array1<f32>,
    scale: &Array1<f32>,
    normalized: &Array1<f32>,
    rows: usize,
    channels: usize,
) -> Array1<f32> {
    let n = rows as f32;
    let mut m1 = Array1::<f32>::zeros(channels);
    let mut m2 = Array1::<f32>::zeros(channels);
    for r in 0..rows {
        for c in 0..channels {
            let idx = r * channels + c;
            m1[c] += dy[idx];
            m2[c] += dy[idx] * normalized[idx];
        }
    }
    m1 /= n;
    m2 /= n;
    let mut out = Array1::zeros(rows * channels);
    for r in 0..rows {
        for c in 0..channels {
            let idx = r * channels + c;
            out[idx] = scale[c] * (dy[idx] - m1[c] - normalized[idx] * m2[c]);
        }
    }
    out
}

/// The input-gradient map of a training-mode batch norm, as a node: given an
/// output-side gradient `dy` this produces
/// `(gamma * inv_std) * (dy - mean(dy) - x_norm * mean(dy * x_norm))`
/// per channel, with `x_norm` and `inv_std` captured from the forward pass.
///
/// The map is linear and self-adjoint in `dy`, so its own backward applies
/// the identical formula to the upstream gradient. `gamma` participates as a
/// learnable leaf.
pub fn bn_input_grad(
    dy: &Tensor,
    gamma: &Tensor,
    normalized: &Array1<f32>,
    inv_std: &Array1<f32>,
    rows: usize,
    channels: usize,
) -> Tensor {
    assert_eq!(dy.len(), rows * channels, "bn_input_grad size mismatch");
    assert_eq!(gamma.len(), channels, "bn_input_grad gamma size mismatch");
    assert_eq!(normalized.len(), rows * channels);
    assert_eq!(inv_std.len(), channels);

    let scale = {
        let g = gamma.data();
        let mut s = Array1::zeros(channels);
        for c in 0..channels {
            s[c] = g[c] * inv_std[c];
        }
        s
    };
    let out = bn_grad_formula(&dy.data(), &scale, normalized, rows, channels);

    let requires_grad = dy.requires_grad() || gamma.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(BnInputGradBackward {
            dy: dy.clone(),
            gamma: gamma.clone(),
            normalized: normalized.clone(),
            inv_std: inv_std.clone(),
            rows,
            channels,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct BnInputGradBackward {
    dy: Tensor,
    gamma: Tensor,
    normalized: Array1<f32>,
    inv_std: Array1<f32>,
    rows: usize,
    channels: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for BnInputGradBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let rows = self.rows;
            let channels = self.channels;
            let scale = {
                let g = self.gamma.data();
                let mut s = Array1::zeros(channels);
                for c in 0..channels {
                    s[c] = g[c] * self.inv_std[c];
                }
                s
            };
            if self.dy.requires_grad() {
                let g_dy = bn_grad_formula(grad, &scale, &self.normalized, rows, channels);
                self.dy.accumulate_grad(g_dy);
            }
            if self.gamma.requires_grad() {
                // The output is gamma-linear: d/d gamma[c] is the formula
                // with scale replaced by inv_std, contracted with the
                // upstream gradient over rows.
                let ones = {
                    let mut s = Array1::zeros(channels);
                    for c in 0..channels {
                        s[c] = self.inv_std[c];
                    }
                    s
                };
                let per_elem =
                    bn_grad_formula(&self.dy.data(), &ones, &self.normalized, rows, channels);
                let mut gg = Array1::zeros(channels);
                for r in 0..rows {
                    for c in 0..channels {
                        let idx = r * channels + c;
                        gg[c] += grad[idx] * per_elem[idx];
                    }
                }
                self.gamma.accumulate_grad(gg);
            }
            if let Some(op) = self.dy.backward_op() {
                op.backward();
            }
            if let Some(op) = self.gamma.backward_op() {
                op.backward();
            }
        }
    }
}
