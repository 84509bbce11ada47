//! Optimizers for adversarial training

mod adam;
mod clip;
mod optimizer;
mod rmsprop;

pub use adam::Adam;
pub use clip::clip_param_values;
pub use optimizer::Optimizer;
pub use rmsprop::RmsProp;
