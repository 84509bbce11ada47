//! Reverse-mode automatic differentiation over flat tensors
//!
//! Ops compute their result eagerly and attach a [`BackwardOp`] that records
//! the inputs needed for the chain rule. [`backward`] seeds the output
//! gradient and walks the recorded graph. Interior nodes are single-consumer
//! by construction (each network invocation builds fresh interiors);
//! parameters are shared leaves that accumulate.

mod backward;
pub mod ops;
mod tensor;

pub use backward::BackwardOp;
pub use tensor::Tensor;

use ndarray::Array1;

/// Run backward from `tensor`, seeding with `grad_output` (ones if `None`).
pub fn backward(tensor: &mut Tensor, grad_output: Option<Array1<f32>>) {
    if !tensor.requires_grad() {
        return;
    }
    let seed = grad_output.unwrap_or_else(|| Array1::ones(tensor.len()));
    assert_eq!(seed.len(), tensor.len(), "gradient seed length mismatch");
    tensor.set_grad(seed);
    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_seeds_ones_for_scalar() {
        let a = Tensor::from_vec(vec![2.0], true);
        let b = Tensor::from_vec(vec![3.0], true);
        let mut c = ops::mul(&a, &b);
        backward(&mut c, None);
        assert_eq!(a.grad().unwrap()[0], 3.0);
        assert_eq!(b.grad().unwrap()[0], 2.0);
    }

    #[test]
    fn test_backward_ignores_untracked() {
        let a = Tensor::from_vec(vec![1.0], false);
        let b = Tensor::from_vec(vec![2.0], false);
        let mut c = ops::mul(&a, &b);
        backward(&mut c, None);
        assert!(a.grad().is_none());
        assert!(c.grad().is_none());
    }

    #[test]
    fn test_backward_custom_seed() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = Tensor::from_vec(vec![4.0, 5.0], true);
        let mut c = ops::add(&a, &b);
        backward(&mut c, Some(Array1::from(vec![2.0, 3.0])));
        assert_eq!(a.grad().unwrap().to_vec(), vec![2.0, 3.0]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![2.0, 3.0]);
    }
}
