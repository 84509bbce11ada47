//! Parameter clipping utilities

use crate::Tensor;

/// Clamp every parameter value into `[-limit, limit]`.
///
/// The weight-clipped critic keeps its parameters inside a fixed box after
/// each update so its score stays Lipschitz-bounded. Applied to values, not
/// gradients.
pub fn clip_param_values(params: &mut [Tensor], limit: f32) {
    assert!(limit > 0.0, "clip limit must be positive");
    for param in params.iter_mut() {
        let mut data = param.data_mut();
        data.mapv_inplace(|x| x.clamp(-limit, limit));
    }
}
