//! Elementwise autograd operations: add, sub, mul, scale, bias

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Elementwise addition of two equal-length tensors.
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "add length mismatch");
    let data = &*a.data() + &*b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
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

/// Elementwise subtraction `a - b`.
pub fn sub(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "sub length mismatch");
    let data = &*a.data() - &*b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(SubBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct SubBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SubBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.mapv(|v| -v));
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

/// Elementwise (Hadamard) product of two distinct tensors.
///
/// For squaring a tensor use [`square`]; aliasing both inputs to the same
/// storage would double-walk its subgraph during backward.
pub fn mul(a: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(a.len(), b.len(), "mul length mismatch");
    let data = &*a.data() * &*b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(MulBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct MulBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MulBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &*self.b.data());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad * &*self.a.data());
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

/// Multiply by a compile-time-known scalar.
pub fn scale(x: &Tensor, factor: f32) -> Tensor {
    let data = x.data().mapv(|v| v * factor);
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(ScaleBackward {
            x: x.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct ScaleBackward {
    x: Tensor,
    factor: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            self.x.accumulate_grad(grad.mapv(|v| v * self.factor));
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Add a scalar constant to every element.
pub fn add_scalar(x: &Tensor, value: f32) -> Tensor {
    let data = x.data().mapv(|v| v + value);
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(AddScalarBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct AddScalarBackward {
    x: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddScalarBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            self.x.accumulate_grad(grad.clone());
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Elementwise multiply by a constant buffer (no gradient into the constant).
pub fn mul_const(x: &Tensor, constant: &Array1<f32>) -> Tensor {
    assert_eq!(x.len(), constant.len(), "mul_const length mismatch");
    let data = &*x.data() * constant;
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(MulConstBackward {
            x: x.clone(),
            constant: constant.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct MulConstBackward {
    x: Tensor,
    constant: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MulConstBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            self.x.accumulate_grad(grad * &self.constant);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Elementwise square.
pub fn square(x: &Tensor) -> Tensor {
    let data = x.data().mapv(|v| v * v);
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(SquareBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct SquareBackward {
    x: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SquareBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let grad_x = grad * &self.x.data().mapv(|v| 2.0 * v);
            self.x.accumulate_grad(grad_x);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Elementwise square root. Inputs must be non-negative.
pub fn sqrt(x: &Tensor) -> Tensor {
    let data = x.data().mapv(f32::sqrt);
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data.clone(), requires_grad);
    if requires_grad {
        let op = Rc::new(SqrtBackward {
            x: x.clone(),
            sqrt_data: data,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct SqrtBackward {
    x: Tensor,
    sqrt_data: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SqrtBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            // d sqrt(x)/dx = 1 / (2 sqrt(x))
            let grad_x = grad / &self.sqrt_data.mapv(|v| 2.0 * v);
            self.x.accumulate_grad(grad_x);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Broadcast-add a per-column bias over a row-major `rows x cols` buffer.
pub fn add_bias(x: &Tensor, bias: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "add_bias input size mismatch");
    assert_eq!(bias.len(), cols, "add_bias bias size mismatch");
    let mut data = x.data().clone();
    {
        let b = bias.data();
        for r in 0..rows {
            for c in 0..cols {
                data[r * cols + c] += b[c];
            }
        }
    }
    let requires_grad = x.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(AddBiasBackward {
            x: x.clone(),
            bias: bias.clone(),
            rows,
            cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct AddBiasBackward {
    x: Tensor,
    bias: Tensor,
    rows: usize,
    cols: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddBiasBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad.clone());
            }
            if self.bias.requires_grad() {
                let mut grad_b = Array1::zeros(self.cols);
                for r in 0..self.rows {
                    for c in 0..self.cols {
                        grad_b[c] += grad[r * self.cols + c];
                    }
                }
                self.bias.accumulate_grad(grad_b);
            }
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
            if let Some(op) = self.bias.backward_op() {
                op.backward();
            }
        }
    }
}
