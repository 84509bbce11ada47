//! Activation autograd operations: relu, leaky relu, scaled tanh

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// ReLU: max(0, x).
pub fn relu(x: &Tensor) -> Tensor {
    let data = x.data().mapv(|v| v.max(0.0));
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(ReluBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct ReluBackward {
    x: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ReluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let mask = self.x.data().mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
            self.x.accumulate_grad(grad * &mask);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Leaky ReLU with the given negative slope.
pub fn leaky_relu(x: &Tensor, slope: f32) -> Tensor {
    let data = x.data().mapv(|v| if v >= 0.0 { v } else { v * slope });
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(LeakyReluBackward {
            x: x.clone(),
            slope,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

/// The slope mask a leaky ReLU applies at `x`: 1 where non-negative, `slope`
/// elsewhere. Used to rebuild the activation's local derivative as a
/// constant.
pub fn leaky_relu_mask(x: &Array1<f32>, slope: f32) -> Array1<f32> {
    x.mapv(|v| if v >= 0.0 { 1.0 } else { slope })
}

struct LeakyReluBackward {
    x: Tensor,
    slope: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for LeakyReluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let mask = leaky_relu_mask(&self.x.data(), self.slope);
            self.x.accumulate_grad(grad * &mask);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// tanh rescaled from [-1, 1] to [0, 1]: tanh(x)/2 + 0.5.
///
/// The generator's output activation; keeps image values in unit range.
pub fn tanh_unit(x: &Tensor) -> Tensor {
    let th = x.data().mapv(f32::tanh);
    let data = th.mapv(|t| t / 2.0 + 0.5);
    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);
    if requires_grad {
        let op = Rc::new(TanhUnitBackward {
            x: x.clone(),
            tanh: th,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct TanhUnitBackward {
    x: Tensor,
    tanh: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for TanhUnitBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            // d(tanh(x)/2 + 1/2)/dx = (1 - tanh^2(x)) / 2
            let local = self.tanh.mapv(|t| (1.0 - t * t) / 2.0);
            self.x.accumulate_grad(grad * &local);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}
