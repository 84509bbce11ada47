//! The training orchestrator: epochs, cadence, sampling, checkpoints.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::autograd::Tensor;
use crate::checkpoint::CheckpointManager;
use crate::data::{ImageSource, TagStore};
use crate::error::{Error, Result};
use crate::gan::{CondGan, ModelConfig, TrainOptions, Variant};
use crate::optim::{Adam, Optimizer, RmsProp};
use crate::sample::save_grid;

use super::batch::{batch_count, uniform_noise, BatchAssembler};

/// Single-threaded training driver.
///
/// Owns the model, both optimizers, and the run's random stream. Each outer
/// batch advances the step counter once regardless of the variant's
/// sub-step cadence; sampling and checkpointing key off that counter.
pub struct Trainer {
    model: CondGan,
    options: TrainOptions,
    manager: CheckpointManager,
    d_opt: Box<dyn Optimizer>,
    g_opt: Box<dyn Optimizer>,
    rng: StdRng,
    err_d: Vec<f32>,
    err_g: Vec<f32>,
}

fn build_optimizer(variant: Variant, options: &TrainOptions) -> Box<dyn Optimizer> {
    match variant {
        Variant::WganClip => Box::new(RmsProp::default_params(options.learning_rate)),
        Variant::Standard | Variant::WganGp => {
            Box::new(Adam::with_beta1(options.learning_rate, options.beta1))
        }
    }
}

fn should_sample(counter: usize, interval: usize) -> bool {
    counter % interval == 1
}

fn should_checkpoint(counter: usize, interval: usize) -> bool {
    counter % interval == 2
}

impl Trainer {
    pub fn new(variant: Variant, config: ModelConfig, options: TrainOptions) -> Result<Self> {
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let model = CondGan::new(&mut rng, variant, &config)?;
        let manager = CheckpointManager::new(&options.save_dir, &config, variant);
        let d_opt = build_optimizer(variant, &options);
        let g_opt = build_optimizer(variant, &options);
        Ok(Self {
            model,
            options,
            manager,
            d_opt,
            g_opt,
            rng,
            err_d: Vec::new(),
            err_g: Vec::new(),
        })
    }

    #[must_use]
    pub fn model(&self) -> &CondGan {
        &self.model
    }

    pub fn train(&mut self) -> Result<()> {
        let config = self.model.config.clone();
        let variant = self.model.variant;

        let store = TagStore::load(
            &self.options.tag_path,
            self.options.tag_path_special.as_deref(),
            config.y_dim,
        )?;
        let source = ImageSource::scan(
            &self.options.data_dir,
            &config.file_pattern,
            config.output_height,
            config.output_width,
            config.c_dim,
            &store,
        )?;
        let assembler = BatchAssembler::new(&source, &store, &config);

        // fixed evaluation batch, drawn once
        let sample_count = config.sample_num;
        let sample_images = Tensor::from_vec(source.load_batch(0, sample_count)?, false);
        let sample_noise = Tensor::from_vec(
            uniform_noise(&mut self.rng, sample_count * config.z_dim),
            false,
        );

        let mut counter: usize = 1;
        match &self.options.init_from {
            Some(dir) => match CheckpointManager::restore(dir, &mut self.model) {
                Ok(step) => {
                    counter = step;
                    println!(" [*] Load SUCCESS");
                }
                Err(_) => {
                    eprintln!(" [!] Load failed...");
                }
            },
            None => println!(" [@] train from scratch"),
        }

        let start = Instant::now();
        for epoch in 0..self.options.epoch {
            let batch_idxs = batch_count(source.len(), self.options.train_size, config.batch_size);
            for idx in 0..batch_idxs {
                let (images, tags) = assembler.paired(idx)?;

                let mut err_d = 0.0;
                let mut last_wrong = None;
                for _ in 0..variant.d_steps() {
                    let wrong = assembler.wrong_tags(&mut self.rng)?;
                    let noise = assembler.noise(&mut self.rng);
                    err_d = self.model.discriminator_step(
                        &mut self.rng,
                        self.d_opt.as_mut(),
                        &images,
                        &tags,
                        &wrong,
                        &noise,
                    );
                    last_wrong = Some(wrong);
                }

                let mut err_g = 0.0;
                for _ in 0..variant.g_steps() {
                    let noise = assembler.noise(&mut self.rng);
                    err_g = self.model.generator_step(self.g_opt.as_mut(), &tags, &noise);
                }

                self.err_d.push(err_d);
                self.err_g.push(err_g);
                counter += 1;

                println!(
                    "Epoch: [{epoch:2}] [{idx:4}/{batch_idxs:4}] time: {:4.4}, d_loss: {err_d:.8}, g_loss: {err_g:.8}",
                    start.elapsed().as_secs_f64()
                );

                if should_sample(counter, variant.sample_interval()) {
                    let outcome = self.sample_step(
                        &sample_noise,
                        &sample_images,
                        &tags,
                        last_wrong.as_ref(),
                        epoch,
                        idx,
                    );
                    if outcome.is_err() {
                        eprintln!("one pic error!...");
                    }
                }

                if should_checkpoint(counter, variant.checkpoint_interval()) {
                    self.manager.save(&self.model, counter)?;
                    self.manager.write_loss_history(&self.err_d, &self.err_g)?;
                }
            }
        }
        Ok(())
    }

    /// Renders the fixed evaluation batch and reports its losses. Failures
    /// are returned to the caller, which logs and keeps training.
    fn sample_step(
        &mut self,
        sample_noise: &Tensor,
        sample_images: &Tensor,
        tags: &Tensor,
        wrong_tags: Option<&Tensor>,
        epoch: usize,
        idx: usize,
    ) -> Result<()> {
        let config = &self.model.config;
        let count = config.sample_num;
        let wrong = wrong_tags
            .ok_or_else(|| Error::Sampling("no mismatched-tag draw available".into()))?;

        let rendered = self.model.sample(sample_noise, tags, count);
        let (d_loss, g_loss) = self.model.evaluate_losses(
            &mut self.rng,
            sample_images,
            tags,
            wrong,
            sample_noise,
            count,
        );

        std::fs::create_dir_all(&self.options.sample_dir)?;
        let path = self
            .options
            .sample_dir
            .join(format!("train_{epoch:02}_{idx:04}.png"));
        save_grid(
            &path,
            &rendered.to_vec(),
            count,
            config.output_height,
            config.output_width,
            config.c_dim,
        )?;
        println!("[Sample] d_loss: {d_loss:.8}, g_loss: {g_loss:.8}");
        Ok(())
    }
}
