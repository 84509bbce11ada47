//! Command-line interface: the `train` and `sample` subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::autograd::Tensor;
use crate::checkpoint::CheckpointManager;
use crate::data::TagStore;
use crate::error::Result;
use crate::gan::{CondGan, ModelConfig, TrainOptions, Variant};
use crate::sample::save_grid;
use crate::train::{uniform_noise, Trainer};

/// Conditional adversarial image trainer
#[derive(Parser, Debug, Clone)]
#[command(name = "retratar")]
#[command(version)]
#[command(about = "Tag-conditioned adversarial image training with DCGAN, WGAN, and WGAN-GP objectives")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Train a model on a tagged image dataset
    Train(TrainArgs),

    /// Restore the latest checkpoint and write one tiled sample grid
    Sample(SampleArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone)]
pub struct TrainArgs {
    /// Objective variant: standard (dcgan), wgan, or wgan-gp
    #[arg(long, default_value = "dcgan")]
    pub variant: Variant,

    /// Number of epochs
    #[arg(long, default_value_t = 300)]
    pub epoch: usize,

    /// Optimizer step size
    #[arg(long, default_value_t = 0.0002)]
    pub learning_rate: f32,

    /// First-moment decay for the Adam variants
    #[arg(long, default_value_t = 0.5)]
    pub beta1: f32,

    /// Cap on examples used per epoch
    #[arg(long)]
    pub train_size: Option<usize>,

    /// Training batch size (the evaluation batch matches it)
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Output image height
    #[arg(long, default_value_t = 64)]
    pub output_height: usize,

    /// Output image width
    #[arg(long, default_value_t = 64)]
    pub output_width: usize,

    /// Image channels
    #[arg(long, default_value_t = 3)]
    pub c_dim: usize,

    /// Tag vector width (9600 selects the two-part embedding)
    #[arg(long, default_value_t = 4800)]
    pub y_dim: usize,

    /// Noise vector width
    #[arg(long, default_value_t = 100)]
    pub z_dim: usize,

    /// Embedding width after projection
    #[arg(long, default_value_t = 256)]
    pub t_dim: usize,

    /// Dataset name (keys the checkpoint directory)
    #[arg(long, default_value = "faces")]
    pub dataset: String,

    /// Dataset file pattern
    #[arg(long, default_value = "*.jpg")]
    pub file_pattern: String,

    /// Dataset image directory
    #[arg(long, default_value = "data/faces")]
    pub data_dir: PathBuf,

    /// Primary tag file (identifier -> vector JSON)
    #[arg(long, default_value = "tags.json")]
    pub tag_path: PathBuf,

    /// Secondary tag file for the two-part embedding
    #[arg(long)]
    pub tag_path_special: Option<PathBuf>,

    /// Checkpoint root (defaults to save_<model name>)
    #[arg(long)]
    pub save_dir: Option<PathBuf>,

    /// Sample grid directory (defaults to temp_samples_<model name>)
    #[arg(long)]
    pub sample_dir: Option<PathBuf>,

    /// Run directory to resume from
    #[arg(long)]
    pub init_from: Option<PathBuf>,

    /// Seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for the sample command
#[derive(Parser, Debug, Clone)]
pub struct SampleArgs {
    /// Run directory holding the latest checkpoint pointer
    #[arg(value_name = "CHECKPOINT_DIR")]
    pub checkpoint_dir: PathBuf,

    /// Objective variant the checkpoint was trained with
    #[arg(long, default_value = "dcgan")]
    pub variant: Variant,

    /// Primary tag file (identifier -> vector JSON)
    #[arg(long, default_value = "tags.json")]
    pub tag_path: PathBuf,

    /// Secondary tag file for the two-part embedding
    #[arg(long)]
    pub tag_path_special: Option<PathBuf>,

    /// Identifier whose tag vector conditions every tile
    #[arg(long)]
    pub tag_id: usize,

    /// Number of tiles (defaults to the evaluation batch size)
    #[arg(long)]
    pub count: Option<usize>,

    /// Output image path
    #[arg(long, default_value = "sample.png")]
    pub out: PathBuf,

    /// Batch size the checkpoint was trained with
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Output image height
    #[arg(long, default_value_t = 64)]
    pub output_height: usize,

    /// Output image width
    #[arg(long, default_value_t = 64)]
    pub output_width: usize,

    /// Image channels
    #[arg(long, default_value_t = 3)]
    pub c_dim: usize,

    /// Tag vector width
    #[arg(long, default_value_t = 4800)]
    pub y_dim: usize,

    /// Noise vector width
    #[arg(long, default_value_t = 100)]
    pub z_dim: usize,

    /// Embedding width after projection
    #[arg(long, default_value_t = 256)]
    pub t_dim: usize,

    /// Noise seed
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Execute a parsed command.
pub fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Train(args) => run_train(args),
        Command::Sample(args) => run_sample(args),
    }
}

fn model_config(
    output_height: usize,
    output_width: usize,
    c_dim: usize,
    batch_size: usize,
    y_dim: usize,
    z_dim: usize,
    t_dim: usize,
    dataset: String,
    file_pattern: String,
) -> ModelConfig {
    ModelConfig {
        output_height,
        output_width,
        c_dim,
        batch_size,
        sample_num: batch_size,
        y_dim,
        z_dim,
        t_dim,
        dataset,
        file_pattern,
        ..ModelConfig::default()
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = model_config(
        args.output_height,
        args.output_width,
        args.c_dim,
        args.batch_size,
        args.y_dim,
        args.z_dim,
        args.t_dim,
        args.dataset,
        args.file_pattern,
    );
    let options = TrainOptions {
        learning_rate: args.learning_rate,
        beta1: args.beta1,
        epoch: args.epoch,
        train_size: args.train_size,
        init_from: args.init_from,
        data_dir: args.data_dir,
        tag_path: args.tag_path,
        tag_path_special: args.tag_path_special,
        save_dir: args
            .save_dir
            .unwrap_or_else(|| args.variant.default_save_dir()),
        sample_dir: args
            .sample_dir
            .unwrap_or_else(|| args.variant.default_sample_dir()),
        seed: args.seed,
    };
    Trainer::new(args.variant, config, options)?.train()
}

fn run_sample(args: SampleArgs) -> Result<()> {
    let defaults = ModelConfig::default();
    let config = model_config(
        args.output_height,
        args.output_width,
        args.c_dim,
        args.batch_size,
        args.y_dim,
        args.z_dim,
        args.t_dim,
        defaults.dataset,
        defaults.file_pattern,
    );
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut model = CondGan::new(&mut rng, args.variant, &config)?;
    let step = CheckpointManager::restore(&args.checkpoint_dir, &mut model)?;
    println!(" [*] Load SUCCESS");

    let store = TagStore::load(
        &args.tag_path,
        args.tag_path_special.as_deref(),
        config.y_dim,
    )?;
    let tag = store.vector(args.tag_id)?;
    let count = args.count.unwrap_or(config.sample_num);
    let mut tags = Vec::with_capacity(count * config.y_dim);
    for _ in 0..count {
        tags.extend_from_slice(&tag);
    }
    let tags = Tensor::from_vec(tags, false);
    let noise = Tensor::from_vec(uniform_noise(&mut rng, count * config.z_dim), false);

    let images = model.sample(&noise, &tags, count);
    save_grid(
        &args.out,
        &images.to_vec(),
        count,
        config.output_height,
        config.output_width,
        config.c_dim,
    )?;
    println!("step {step}: wrote {}", args.out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_train_defaults() {
        let cli = Cli::try_parse_from(["retratar", "train"]).unwrap();
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.variant, Variant::Standard);
        assert_eq!(args.epoch, 300);
        assert_eq!(args.batch_size, 64);
        assert!(args.save_dir.is_none());
    }

    #[test]
    fn test_variant_aliases() {
        for (name, variant) in [
            ("dcgan", Variant::Standard),
            ("standard", Variant::Standard),
            ("wgan", Variant::WganClip),
            ("wgan-gp", Variant::WganGp),
            ("wgan-v2", Variant::WganGp),
        ] {
            let cli =
                Cli::try_parse_from(["retratar", "train", "--variant", name]).unwrap();
            let Command::Train(args) = cli.command else {
                panic!("expected train");
            };
            assert_eq!(args.variant, variant, "alias {name}");
        }
    }

    #[test]
    fn test_unknown_variant_rejected() {
        assert!(Cli::try_parse_from(["retratar", "train", "--variant", "lsgan"]).is_err());
    }

    #[test]
    fn test_sample_requires_checkpoint_dir() {
        assert!(Cli::try_parse_from(["retratar", "sample", "--tag-id", "3"]).is_err());
        let cli = Cli::try_parse_from([
            "retratar", "sample", "save/run", "--tag-id", "3", "--count", "4",
        ])
        .unwrap();
        let Command::Sample(args) = cli.command else {
            panic!("expected sample");
        };
        assert_eq!(args.tag_id, 3);
        assert_eq!(args.count, Some(4));
        assert_eq!(args.checkpoint_dir, PathBuf::from("save/run"));
    }
}
