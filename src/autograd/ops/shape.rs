//! Layout operations: channel concat/slice and spatial tiling (NHWC)

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Concatenate two channels-last buffers along the channel axis.
///
/// `a` is `rows x ca`, `b` is `rows x cb`; the result is `rows x (ca + cb)`
/// with `a`'s channels first. Also serves feature-vector concat with
/// `rows = batch`.
pub fn concat_channels(a: &Tensor, b: &Tensor, rows: usize, ca: usize, cb: usize) -> Tensor {
    assert_eq!(a.len(), rows * ca, "concat_channels lhs size mismatch");
    assert_eq!(b.len(), rows * cb, "concat_channels rhs size mismatch");
    let a_data = a.data();
    let b_data = b.data();
    let ct = ca + cb;
    let mut out = Array1::zeros(rows * ct);
    for r in 0..rows {
        for c in 0..ca {
            out[r * ct + c] = a_data[r * ca + c];
        }
        for c in 0..cb {
            out[r * ct + ca + c] = b_data[r * cb + c];
        }
    }
    drop(a_data);
    drop(b_data);

    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(ConcatChannelsBackward {
            a: a.clone(),
            b: b.clone(),
            rows,
            ca,
            cb,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct ConcatChannelsBackward {
    a: Tensor,
    b: Tensor,
    rows: usize,
    ca: usize,
    cb: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ConcatChannelsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let ct = self.ca + self.cb;
            if self.a.requires_grad() {
                let mut ga = Array1::zeros(self.rows * self.ca);
                for r in 0..self.rows {
                    for c in 0..self.ca {
                        ga[r * self.ca + c] = grad[r * ct + c];
                    }
                }
                self.a.accumulate_grad(ga);
            }
            if self.b.requires_grad() {
                let mut gb = Array1::zeros(self.rows * self.cb);
                for r in 0..self.rows {
                    for c in 0..self.cb {
                        gb[r * self.cb + c] = grad[r * ct + self.ca + c];
                    }
                }
                self.b.accumulate_grad(gb);
            }
            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
            if let Some(op) = self.b.backward_op() {
                op.backward();
            }
        }
    }
}

/// Keep channels `from..to` of a `rows x c_total` buffer. The backward pass
/// zero-pads the dropped channels.
pub fn slice_channels(x: &Tensor, rows: usize, c_total: usize, from: usize, to: usize) -> Tensor {
    assert!(from < to && to <= c_total, "slice_channels bad range");
    assert_eq!(x.len(), rows * c_total, "slice_channels input size mismatch");
    let width = to - from;
    let x_data = x.data();
    let mut out = Array1::zeros(rows * width);
    for r in 0..rows {
        for c in 0..width {
            out[r * width + c] = x_data[r * c_total + from + c];
        }
    }
    drop(x_data);

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(SliceChannelsBackward {
            x: x.clone(),
            rows,
            c_total,
            from,
            to,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct SliceChannelsBackward {
    x: Tensor,
    rows: usize,
    c_total: usize,
    from: usize,
    to: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SliceChannelsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let width = self.to - self.from;
            let mut gx = Array1::zeros(self.rows * self.c_total);
            for r in 0..self.rows {
                for c in 0..width {
                    gx[r * self.c_total + self.from + c] = grad[r * width + c];
                }
            }
            self.x.accumulate_grad(gx);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Tile per-example feature vectors over a spatial grid: a `[batch, dim]`
/// input becomes `[batch, h, w, dim]` with the vector repeated at every
/// position. The backward pass sums over space.
pub fn tile_spatial(x: &Tensor, batch: usize, dim: usize, h: usize, w: usize) -> Tensor {
    assert_eq!(x.len(), batch * dim, "tile_spatial input size mismatch");
    let x_data = x.data();
    let mut out = Array1::zeros(batch * h * w * dim);
    for b in 0..batch {
        for p in 0..h * w {
            for c in 0..dim {
                out[(b * h * w + p) * dim + c] = x_data[b * dim + c];
            }
        }
    }
    drop(x_data);

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(TileSpatialBackward {
            x: x.clone(),
            batch,
            dim,
            h,
            w,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct TileSpatialBackward {
    x: Tensor,
    batch: usize,
    dim: usize,
    h: usize,
    w: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for TileSpatialBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let spatial = self.h * self.w;
            let mut gx = Array1::zeros(self.batch * self.dim);
            for b in 0..self.batch {
                for p in 0..spatial {
                    for c in 0..self.dim {
                        gx[b * self.dim + c] += grad[(b * spatial + p) * self.dim + c];
                    }
                }
            }
            self.x.accumulate_grad(gx);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}
