//! Classification loss on raw scores

use crate::autograd::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Mean sigmoid cross-entropy computed directly on logits, with every
/// element sharing the constant target `target` (1.0 for real, 0.0 for
/// generated). Uses the overflow-safe form
/// `max(x, 0) - x*z + ln(1 + exp(-|x|))`.
pub fn bce_with_logits(logits: &Tensor, target: f32) -> Tensor {
    let n = logits.len();
    assert!(n > 0, "bce_with_logits over empty tensor");
    let data = logits.data();
    let mut total = 0.0f32;
    for &x in data.iter() {
        total += x.max(0.0) - x * target + (-x.abs()).exp().ln_1p();
    }
    drop(data);
    let mean = total / n as f32;

    let requires_grad = logits.requires_grad();
    let mut result = Tensor::new(Array1::from(vec![mean]), requires_grad);
    if requires_grad {
        let op = Rc::new(BceWithLogitsBackward {
            logits: logits.clone(),
            target,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(op);
    }
    result
}

struct BceWithLogitsBackward {
    logits: Tensor,
    target: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for BceWithLogitsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let n = self.logits.len() as f32;
            let scale = grad[0] / n;
            let data = self.logits.data();
            let gx = data.mapv(|x| {
                let s = 1.0 / (1.0 + (-x).exp());
                scale * (s - self.target)
            });
            drop(data);
            self.logits.accumulate_grad(gx);
            if let Some(op) = self.logits.backward_op() {
                op.backward();
            }
        }
    }
}
