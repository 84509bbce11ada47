//! Per-variant adversarial loss construction.
//!
//! Every builder returns the node the optimizer minimizes together with the
//! value recorded in the loss history, which for the Wasserstein variants is
//! the maximized critic surplus rather than the minimized negation.

use crate::autograd::ops::{
    add, add_scalar, bce_with_logits, mean_all, scale, sqrt, square, sub, sum_per_example,
};
use crate::autograd::Tensor;

use super::config::Variant;

/// Discriminator objective over batches scored under the three pairings:
/// real image with matching tags, generated image with matching tags, and
/// real image with mismatched tags.
///
/// `penalty` must be present exactly for [`Variant::WganGp`].
pub fn discriminator_loss(
    variant: Variant,
    real: &Tensor,
    fake: &Tensor,
    wrong: &Tensor,
    penalty: Option<&Tensor>,
) -> (Tensor, f32) {
    match variant {
        Variant::Standard => {
            debug_assert!(penalty.is_none());
            let loss_real = bce_with_logits(real, 1.0);
            let loss_fake = bce_with_logits(fake, 0.0);
            let loss_wrong = bce_with_logits(wrong, 0.0);
            let loss = add(&add(&loss_real, &loss_fake), &loss_wrong);
            let value = loss.item();
            (loss, value)
        }
        Variant::WganClip | Variant::WganGp => {
            let surplus = sub(&sub(&mean_all(real), &mean_all(fake)), &mean_all(wrong));
            let surplus = match penalty {
                Some(p) => {
                    debug_assert_eq!(variant, Variant::WganGp);
                    sub(&surplus, p)
                }
                None => {
                    debug_assert_eq!(variant, Variant::WganClip);
                    surplus
                }
            };
            let value = surplus.item();
            (scale(&surplus, -1.0), value)
        }
    }
}

/// Generator objective over the scores of generated images paired with
/// their conditioning tags.
pub fn generator_loss(variant: Variant, fake: &Tensor) -> (Tensor, f32) {
    match variant {
        Variant::Standard => {
            let loss = bce_with_logits(fake, 1.0);
            let value = loss.item();
            (loss, value)
        }
        Variant::WganClip | Variant::WganGp => {
            let loss = scale(&mean_all(fake), -1.0);
            let value = loss.item();
            (loss, value)
        }
    }
}

/// Penalty drawing per-example gradient norms toward one.
///
/// The norm runs over every non-batch dimension of the gradient, so each
/// example contributes a single scalar regardless of image shape.
pub fn gradient_penalty(
    input_grad: &Tensor,
    batch: usize,
    per_example: usize,
    coefficient: f32,
) -> Tensor {
    let per_ex = sum_per_example(&square(input_grad), batch, per_example);
    let excess = add_scalar(&sqrt(&per_ex), -1.0);
    scale(&mean_all(&square(&excess)), coefficient)
}

/// Pointwise blend `epsilon * real + (1 - epsilon) * fake` with one shared
/// blending factor for the whole batch. The result is a plain constant; the
/// penalty differentiates the score with respect to it, not through it.
pub fn interpolate(real: &Tensor, fake: &Tensor, epsilon: f32) -> Tensor {
    assert_eq!(real.len(), fake.len(), "interpolation operands must match");
    let r = real.data();
    let f = fake.data();
    let blended: Vec<f32> = r
        .iter()
        .zip(f.iter())
        .map(|(&a, &b)| epsilon * a + (1.0 - epsilon) * b)
        .collect();
    Tensor::from_vec(blended, false)
}
