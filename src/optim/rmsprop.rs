//! RMSProp optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::Array1;

/// RMSProp with a decaying mean of squared gradients
///
/// Update: ms_t = ρ * ms_{t-1} + (1 - ρ) * g²,
/// θ_t = θ_{t-1} - lr * g / √(ms_t + ε).
pub struct RmsProp {
    lr: f32,
    decay: f32,
    epsilon: f32,
    ms: Vec<Option<Array1<f32>>>, // Mean of squared gradients
}

impl RmsProp {
    /// Create a new RMSProp optimizer
    pub fn new(lr: f32, decay: f32, epsilon: f32) -> Self {
        Self {
            lr,
            decay,
            epsilon,
            ms: Vec::new(),
        }
    }

    /// RMSProp with the usual defaults (ρ = 0.9, ε = 1e-10)
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 1e-10)
    }

    fn ensure_cache(&mut self, params: &[Tensor]) {
        if self.ms.is_empty() {
            self.ms = params.iter().map(|_| None).collect();
        }
    }
}

impl Optimizer for RmsProp {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_cache(params);

        for (i, param) in params.iter_mut().enumerate() {
            if let Some(grad) = param.grad() {
                let grad_sq = &grad * &grad;
                let ms_t = if let Some(ms) = &self.ms[i] {
                    ms * self.decay + &grad_sq * (1.0 - self.decay)
                } else {
                    &grad_sq * (1.0 - self.decay)
                };

                let update = &grad / &((&ms_t + self.epsilon).mapv(f32::sqrt)) * self.lr;
                {
                    let mut data = param.data_mut();
                    *data -= &update;
                }

                self.ms[i] = Some(ms_t);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
