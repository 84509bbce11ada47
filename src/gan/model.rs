//! The conditional adversarial model: both networks plus variant dispatch
//! for training steps.

use std::collections::HashMap;

use ndarray::Array1;
use rand::Rng;

use crate::autograd::{backward, Tensor};
use crate::error::{Error, Result};
use crate::optim::{clip_param_values, Optimizer};

use super::config::{ModelConfig, Variant};
use super::discriminator::Discriminator;
use super::generator::Generator;
use super::objective::{discriminator_loss, generator_loss, gradient_penalty, interpolate};

/// Generator and discriminator under one objective variant.
///
/// The model owns the networks and the per-step math; batch assembly,
/// optimizer state, and cadence live with the caller. Parameter handles
/// passed to optimizers are clones sharing storage with the layers, so a
/// step through one handle is visible everywhere.
pub struct CondGan {
    pub config: ModelConfig,
    pub variant: Variant,
    pub generator: Generator,
    pub discriminator: Discriminator,
}

impl CondGan {
    pub fn new<R: Rng>(rng: &mut R, variant: Variant, config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            variant,
            generator: Generator::new(rng, config),
            discriminator: Discriminator::new(rng, config),
        })
    }

    /// Fresh handles to the discriminator's trainable parameters.
    pub fn d_params(&self) -> Vec<Tensor> {
        self.discriminator.parameters().into_iter().cloned().collect()
    }

    /// Fresh handles to the generator's trainable parameters.
    pub fn g_params(&self) -> Vec<Tensor> {
        self.generator.parameters().into_iter().cloned().collect()
    }

    fn zero_all_grads(&self) {
        for p in self.discriminator.parameters() {
            p.zero_grad();
        }
        for p in self.generator.parameters() {
            p.zero_grad();
        }
    }

    /// One discriminator update on a batch: score the three pairings, add
    /// the variant's penalty if any, and step only the discriminator's
    /// parameters. Returns the recorded loss value.
    pub fn discriminator_step<R: Rng>(
        &self,
        rng: &mut R,
        opt: &mut dyn Optimizer,
        images: &Tensor,
        tags: &Tensor,
        wrong_tags: &Tensor,
        noise: &Tensor,
    ) -> f32 {
        let batch = self.config.batch_size;
        self.zero_all_grads();

        // the generator is a constant for this step
        let fake = self.generator.forward(noise, tags, batch).detach();

        let real_score = self.discriminator.score(images, tags, batch);
        let fake_score = self.discriminator.score(&fake, tags, batch);
        let wrong_score = self.discriminator.score(images, wrong_tags, batch);

        let penalty = match self.variant {
            Variant::WganGp => {
                let epsilon = rng.random::<f32>();
                let blended = interpolate(images, &fake, epsilon);
                let (_, trace) = self.discriminator.score_with_trace(&blended, tags, batch);
                let grad = self.discriminator.input_gradient(&trace);
                Some(gradient_penalty(
                    &grad,
                    batch,
                    self.config.image_len(),
                    self.config.penalty_scale,
                ))
            }
            Variant::Standard | Variant::WganClip => None,
        };

        let (mut loss, value) = discriminator_loss(
            self.variant,
            &real_score,
            &fake_score,
            &wrong_score,
            penalty.as_ref(),
        );
        backward(&mut loss, None);

        let mut d_params = self.d_params();
        opt.step(&mut d_params);
        if self.variant == Variant::WganClip {
            clip_param_values(&mut d_params, self.config.clip_value);
        }
        value
    }

    /// One generator update on a batch: push generated images through the
    /// discriminator and step only the generator's parameters. Returns the
    /// recorded loss value.
    pub fn generator_step(
        &self,
        opt: &mut dyn Optimizer,
        tags: &Tensor,
        noise: &Tensor,
    ) -> f32 {
        let batch = self.config.batch_size;
        self.zero_all_grads();

        let fake = self.generator.forward(noise, tags, batch);
        let fake_score = self.discriminator.score(&fake, tags, batch);
        let (mut loss, value) = generator_loss(self.variant, &fake_score);
        backward(&mut loss, None);

        let mut g_params = self.g_params();
        opt.step(&mut g_params);
        value
    }

    /// Loss values on a held-out batch without touching any parameter.
    /// Mirrors the step-time construction, penalty included.
    pub fn evaluate_losses<R: Rng>(
        &self,
        rng: &mut R,
        images: &Tensor,
        tags: &Tensor,
        wrong_tags: &Tensor,
        noise: &Tensor,
        batch: usize,
    ) -> (f32, f32) {
        let fake = self.generator.forward(noise, tags, batch).detach();
        let real_score = self.discriminator.score(images, tags, batch);
        let fake_score = self.discriminator.score(&fake, tags, batch);
        let wrong_score = self.discriminator.score(images, wrong_tags, batch);

        let penalty = match self.variant {
            Variant::WganGp => {
                let epsilon = rng.random::<f32>();
                let blended = interpolate(images, &fake, epsilon);
                let (_, trace) = self.discriminator.score_with_trace(&blended, tags, batch);
                let grad = self.discriminator.input_gradient(&trace);
                Some(gradient_penalty(
                    &grad,
                    batch,
                    self.config.image_len(),
                    self.config.penalty_scale,
                ))
            }
            Variant::Standard | Variant::WganClip => None,
        };
        let (_, d_value) = discriminator_loss(
            self.variant,
            &real_score,
            &fake_score,
            &wrong_score,
            penalty.as_ref(),
        );
        let (_, g_value) = generator_loss(self.variant, &fake_score);

        (d_value, g_value)
    }

    /// Generated images for a noise/tag batch, in [0,1], using running
    /// normalization statistics.
    pub fn sample(&self, noise: &Tensor, tags: &Tensor, batch: usize) -> Tensor {
        self.generator.sample(noise, tags, batch)
    }

    /// Every persistent tensor of both networks with its checkpoint name.
    pub fn state(&self) -> Vec<(String, Tensor)> {
        let mut state = self.generator.state();
        state.extend(self.discriminator.state());
        state
    }

    /// Overwrites every persistent tensor from a name-to-values map. The
    /// map must cover the model exactly; any missing, extra, or misshapen
    /// entry fails the whole load with the model untouched.
    pub fn load_state(&mut self, entries: &HashMap<String, Vec<f32>>) -> Result<()> {
        let state = self.state();
        for (name, tensor) in &state {
            let values = entries.get(name).ok_or_else(|| {
                Error::Checkpoint(format!("missing tensor {name} in checkpoint"))
            })?;
            if values.len() != tensor.len() {
                return Err(Error::Checkpoint(format!(
                    "tensor {name} has {} values, expected {}",
                    values.len(),
                    tensor.len()
                )));
            }
        }
        if entries.len() != state.len() {
            return Err(Error::Checkpoint(format!(
                "checkpoint holds {} tensors, model has {}",
                entries.len(),
                state.len()
            )));
        }
        for (name, tensor) in &state {
            let values = &entries[name];
            *tensor.data_mut() = Array1::from_vec(values.clone());
        }
        Ok(())
    }
}
