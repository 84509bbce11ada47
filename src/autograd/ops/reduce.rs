//! Reductions used by the adversarial losses

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Mean over every element, producing a length-1 tensor.
pub fn mean_all(x: &Tensor) -> Tensor {
    let n = x.len();
    assert!(n > 0, "mean_all over empty tensor");
    let mean = x.data().iter().sum::<f32>() / n as f32;

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(Array1::from(vec![mean]), requires_grad);
    if requires_grad {
        let op = Rc::new(MeanAllBackward {
            x: x.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct MeanAllBackward {
    x: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MeanAllBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let n = self.x.len() as f32;
            let g = grad[0] / n;
            self.x.accumulate_grad(Array1::from_elem(self.x.len(), g));
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Sum each example's `per` elements, collapsing `[batch, per]` to `[batch]`.
pub fn sum_per_example(x: &Tensor, batch: usize, per: usize) -> Tensor {
    assert_eq!(x.len(), batch * per, "sum_per_example size mismatch");
    let x_data = x.data();
    let mut out = Array1::zeros(batch);
    for b in 0..batch {
        for i in 0..per {
            out[b] += x_data[b * per + i];
        }
    }
    drop(x_data);

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(out, requires_grad);
    if requires_grad {
        let op = Rc::new(SumPerExampleBackward {
            x: x.clone(),
            batch,
            per,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct SumPerExampleBackward {
    x: Tensor,
    batch: usize,
    per: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SumPerExampleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let mut gx = Array1::zeros(self.batch * self.per);
            for b in 0..self.batch {
                for i in 0..self.per {
                    gx[b * self.per + i] = grad[b];
                }
            }
            self.x.accumulate_grad(gx);
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;

    #[test]
    fn test_mean_all() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 6.0], true);
        let mut y = mean_all(&x);
        assert!((y.item() - 3.0).abs() < 1e-6);
        backward(&mut y, None);
        let g = x.grad().unwrap();
        for i in 0..4 {
            assert!((g[i] - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sum_per_example() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], true);
        let mut y = sum_per_example(&x, 2, 3);
        assert_eq!(y.to_vec(), vec![6.0, 15.0]);
        backward(&mut y, Some(Array1::from(vec![1.0, 10.0])));
        assert_eq!(
            x.grad().unwrap().to_vec(),
            vec![1.0, 1.0, 1.0, 10.0, 10.0, 10.0]
        );
    }
}
