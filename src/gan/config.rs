//! Configuration types for the conditional image GAN.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tag width that switches the embedding projector into two-part mode
/// (concatenated hair + eyes vectors of 4800 each).
pub const SPLIT_TAG_WIDTH: usize = 9600;

/// Adversarial objective variant. Selected once at construction; every
/// cadence, optimizer, and interval choice derives from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    /// Sigmoid cross-entropy GAN
    Standard,
    /// Wasserstein GAN with weight clipping
    WganClip,
    /// Wasserstein GAN with gradient penalty
    WganGp,
}

impl Variant {
    /// Name used in checkpoint files and default directories.
    #[must_use]
    pub fn model_name(self) -> &'static str {
        match self {
            Variant::Standard => "DCGAN",
            Variant::WganClip => "WGAN",
            Variant::WganGp => "WGAN_v2",
        }
    }

    /// Discriminator updates per training step.
    #[must_use]
    pub fn d_steps(self) -> usize {
        match self {
            Variant::Standard => 1,
            Variant::WganClip | Variant::WganGp => 5,
        }
    }

    /// Generator updates per training step.
    #[must_use]
    pub fn g_steps(self) -> usize {
        match self {
            Variant::Standard => 2,
            Variant::WganClip | Variant::WganGp => 1,
        }
    }

    /// Steps between sampler invocations.
    #[must_use]
    pub fn sample_interval(self) -> usize {
        match self {
            Variant::Standard | Variant::WganClip => 500,
            Variant::WganGp => 200,
        }
    }

    /// Steps between checkpoints.
    #[must_use]
    pub fn checkpoint_interval(self) -> usize {
        match self {
            Variant::Standard | Variant::WganClip => 2000,
            Variant::WganGp => 500,
        }
    }

    #[must_use]
    pub fn default_save_dir(self) -> PathBuf {
        PathBuf::from(format!("save_{}", self.model_name()))
    }

    #[must_use]
    pub fn default_sample_dir(self) -> PathBuf {
        PathBuf::from(format!("temp_samples_{}", self.model_name()))
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "dcgan" => Ok(Variant::Standard),
            "wgan" | "wgan-clip" => Ok(Variant::WganClip),
            "wgan-gp" | "wgan-v2" => Ok(Variant::WganGp),
            _ => Err(format!(
                "Unknown variant: {s}. Valid variants: standard, wgan, wgan-gp"
            )),
        }
    }
}

/// Spatial extents of the four up/down-sampling stages, derived by repeated
/// ceiling halving of the output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialChain {
    pub s: (usize, usize),
    pub s2: (usize, usize),
    pub s4: (usize, usize),
    pub s8: (usize, usize),
    pub s16: (usize, usize),
}

/// Architectural shape of the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Output image height
    pub output_height: usize,
    /// Output image width
    pub output_width: usize,
    /// Image channels
    pub c_dim: usize,
    /// Training batch size
    pub batch_size: usize,
    /// Size of the fixed evaluation batch
    pub sample_num: usize,
    /// Tag vector width
    pub y_dim: usize,
    /// Noise vector width
    pub z_dim: usize,
    /// Embedding width after projection
    pub t_dim: usize,
    /// Generator filters in the last deconv stage
    pub gf_dim: usize,
    /// Discriminator filters in the first conv stage
    pub df_dim: usize,
    /// Dataset name (keys the checkpoint directory)
    pub dataset: String,
    /// Glob-style pattern matching dataset files by extension
    pub file_pattern: String,
    /// Weight clip bound for the clipped critic
    pub clip_value: f32,
    /// Gradient penalty coefficient
    pub penalty_scale: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            output_height: 64,
            output_width: 64,
            c_dim: 3,
            batch_size: 64,
            sample_num: 64,
            y_dim: 4800,
            z_dim: 100,
            t_dim: 256,
            gf_dim: 64,
            df_dim: 64,
            dataset: "faces".to_string(),
            file_pattern: "*.jpg".to_string(),
            clip_value: 0.01,
            penalty_scale: 10.0,
        }
    }
}

impl ModelConfig {
    /// Small shape for fast tests
    #[must_use]
    pub fn tiny() -> Self {
        Self {
            output_height: 8,
            output_width: 8,
            c_dim: 1,
            batch_size: 2,
            sample_num: 2,
            y_dim: 6,
            z_dim: 5,
            t_dim: 4,
            gf_dim: 4,
            df_dim: 4,
            dataset: "tiny".to_string(),
            file_pattern: "*.jpg".to_string(),
            clip_value: 0.01,
            penalty_scale: 10.0,
        }
    }

    /// Whether tag vectors carry two independently projected halves.
    #[must_use]
    pub fn split_embedding(&self) -> bool {
        self.y_dim == SPLIT_TAG_WIDTH
    }

    /// Stage extents from the output size down to the initial volume.
    #[must_use]
    pub fn spatial_chain(&self) -> SpatialChain {
        let half = |(h, w): (usize, usize)| (h.div_ceil(2), w.div_ceil(2));
        let s = (self.output_height, self.output_width);
        let s2 = half(s);
        let s4 = half(s2);
        let s8 = half(s4);
        let s16 = half(s8);
        SpatialChain { s, s2, s4, s8, s16 }
    }

    /// Elements per image tensor.
    #[must_use]
    pub fn image_len(&self) -> usize {
        self.output_height * self.output_width * self.c_dim
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.sample_num == 0 {
            return Err(Error::Config("batch_size and sample_num must be nonzero".into()));
        }
        if self.sample_num != self.batch_size {
            return Err(Error::Config(
                "sample_num must equal batch_size; the evaluation batch borrows the \
                 current batch's tags"
                    .into(),
            ));
        }
        if self.output_height == 0 || self.output_width == 0 || self.c_dim == 0 {
            return Err(Error::Config("image dimensions must be nonzero".into()));
        }
        if self.y_dim == 0 || self.z_dim == 0 || self.t_dim == 0 {
            return Err(Error::Config("vector widths must be nonzero".into()));
        }
        if self.gf_dim == 0 || self.df_dim == 0 {
            return Err(Error::Config("filter counts must be nonzero".into()));
        }
        if self.split_embedding() && self.t_dim % 2 != 0 {
            return Err(Error::Config(
                "two-part embedding requires an even t_dim".into(),
            ));
        }
        Ok(())
    }
}

/// Training knobs supplied by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOptions {
    /// Optimizer step size
    pub learning_rate: f32,
    /// First-moment decay for the Adam variants
    pub beta1: f32,
    /// Number of epochs
    pub epoch: usize,
    /// Cap on examples used per epoch (None = all)
    pub train_size: Option<usize>,
    /// Checkpoint directory to resume from (None = fresh run)
    pub init_from: Option<PathBuf>,
    /// Dataset image directory
    pub data_dir: PathBuf,
    /// Primary tag file (identifier -> vector JSON)
    pub tag_path: PathBuf,
    /// Secondary tag file for two-part embeddings
    pub tag_path_special: Option<PathBuf>,
    /// Checkpoint root
    pub save_dir: PathBuf,
    /// Sample grid output directory
    pub sample_dir: PathBuf,
    /// Seed for reproducible runs (None = OS entropy)
    pub seed: Option<u64>,
}

impl TrainOptions {
    /// Defaults for a variant, with directories derived from its name.
    #[must_use]
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            learning_rate: 0.0002,
            beta1: 0.5,
            epoch: 300,
            train_size: None,
            init_from: None,
            data_dir: PathBuf::from("data/faces"),
            tag_path: PathBuf::from("tags.json"),
            tag_path_special: None,
            save_dir: variant.default_save_dir(),
            sample_dir: variant.default_sample_dir(),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.output_height, 64);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.y_dim, 4800);
        assert_eq!(config.z_dim, 100);
        assert_eq!(config.t_dim, 256);
        assert!(!config.split_embedding());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_split_mode_trigger() {
        let mut config = ModelConfig::default();
        config.y_dim = SPLIT_TAG_WIDTH;
        assert!(config.split_embedding());
        config.y_dim = 4800;
        assert!(!config.split_embedding());
    }

    #[test]
    fn test_spatial_chain_64() {
        let chain = ModelConfig::default().spatial_chain();
        assert_eq!(chain.s, (64, 64));
        assert_eq!(chain.s2, (32, 32));
        assert_eq!(chain.s4, (16, 16));
        assert_eq!(chain.s8, (8, 8));
        assert_eq!(chain.s16, (4, 4));
    }

    #[test]
    fn test_spatial_chain_odd_rounds_up() {
        let mut config = ModelConfig::tiny();
        config.output_height = 7;
        config.output_width = 7;
        let chain = config.spatial_chain();
        assert_eq!(chain.s2, (4, 4));
        assert_eq!(chain.s4, (2, 2));
        assert_eq!(chain.s8, (1, 1));
        assert_eq!(chain.s16, (1, 1));
    }

    #[test]
    fn test_variant_table() {
        assert_eq!(Variant::Standard.model_name(), "DCGAN");
        assert_eq!(Variant::Standard.d_steps(), 1);
        assert_eq!(Variant::Standard.g_steps(), 2);
        assert_eq!(Variant::Standard.sample_interval(), 500);
        assert_eq!(Variant::Standard.checkpoint_interval(), 2000);

        assert_eq!(Variant::WganClip.model_name(), "WGAN");
        assert_eq!(Variant::WganClip.d_steps(), 5);
        assert_eq!(Variant::WganClip.g_steps(), 1);

        assert_eq!(Variant::WganGp.model_name(), "WGAN_v2");
        assert_eq!(Variant::WganGp.sample_interval(), 200);
        assert_eq!(Variant::WganGp.checkpoint_interval(), 500);
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!(Variant::from_str("standard").unwrap(), Variant::Standard);
        assert_eq!(Variant::from_str("WGAN").unwrap(), Variant::WganClip);
        assert_eq!(Variant::from_str("wgan-gp").unwrap(), Variant::WganGp);
        assert!(Variant::from_str("lsgan").is_err());
    }

    #[test]
    fn test_variant_default_dirs() {
        assert_eq!(
            Variant::WganGp.default_save_dir(),
            PathBuf::from("save_WGAN_v2")
        );
        assert_eq!(
            Variant::Standard.default_sample_dir(),
            PathBuf::from("temp_samples_DCGAN")
        );
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = ModelConfig::tiny();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_odd_t_dim_in_split_mode() {
        let mut config = ModelConfig::tiny();
        config.y_dim = SPLIT_TAG_WIDTH;
        config.t_dim = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_train_options_for_variant() {
        let opts = TrainOptions::for_variant(Variant::WganClip);
        assert_eq!(opts.learning_rate, 0.0002);
        assert_eq!(opts.beta1, 0.5);
        assert_eq!(opts.save_dir, PathBuf::from("save_WGAN"));
        assert!(opts.init_from.is_none());
    }
}
