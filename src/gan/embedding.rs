//! Conditional embedding projector

use crate::autograd::ops::{concat_channels, leaky_relu, slice_channels};
use crate::autograd::Tensor;
use crate::gan::LRELU_SLOPE;
use crate::nn::Linear;
use rand::Rng;

use super::config::SPLIT_TAG_WIDTH;

/// Projects tag vectors into the conditioning embedding the networks consume.
///
/// Tag width 9600 signals a concatenated hair+eyes vector; the two halves
/// then get independent projections to `t_dim / 2` each, rejoined in order.
/// Any other width uses one projection to `t_dim`. Both modes end with a
/// leaky rectification.
pub enum TagProjector {
    Single(Linear),
    Split { hair: Linear, eyes: Linear },
}

impl TagProjector {
    pub fn new<R: Rng>(rng: &mut R, y_dim: usize, t_dim: usize) -> Self {
        if y_dim == SPLIT_TAG_WIDTH {
            TagProjector::Split {
                hair: Linear::new(rng, y_dim / 2, t_dim / 2),
                eyes: Linear::new(rng, y_dim / 2, t_dim / 2),
            }
        } else {
            TagProjector::Single(Linear::new(rng, y_dim, t_dim))
        }
    }

    /// `[batch, y_dim]` tags to a `[batch, t_dim]` embedding.
    pub fn forward(&self, tags: &Tensor, batch: usize) -> Tensor {
        match self {
            TagProjector::Single(proj) => {
                leaky_relu(&proj.forward(tags, batch), LRELU_SLOPE)
            }
            TagProjector::Split { hair, eyes } => {
                let y_dim = hair.in_features() * 2;
                let half_t = hair.out_features();
                let first = slice_channels(tags, batch, y_dim, 0, y_dim / 2);
                let second = slice_channels(tags, batch, y_dim, y_dim / 2, y_dim);
                let hair_emb = leaky_relu(&hair.forward(&first, batch), LRELU_SLOPE);
                let eyes_emb = leaky_relu(&eyes.forward(&second, batch), LRELU_SLOPE);
                concat_channels(&hair_emb, &eyes_emb, batch, half_t, half_t)
            }
        }
    }

    #[must_use]
    pub fn out_dim(&self) -> usize {
        match self {
            TagProjector::Single(proj) => proj.out_features(),
            TagProjector::Split { hair, .. } => hair.out_features() * 2,
        }
    }

    #[must_use]
    pub fn is_split(&self) -> bool {
        matches!(self, TagProjector::Split { .. })
    }

    pub fn parameters(&self) -> Vec<&Tensor> {
        match self {
            TagProjector::Single(proj) => proj.parameters(),
            TagProjector::Split { hair, eyes } => {
                let mut params = hair.parameters();
                params.extend(eyes.parameters());
                params
            }
        }
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            TagProjector::Single(proj) => proj.parameters_mut(),
            TagProjector::Split { hair, eyes } => {
                let mut params = hair.parameters_mut();
                params.extend(eyes.parameters_mut());
                params
            }
        }
    }

    /// Named tensors for checkpointing. `net` is the owning network prefix,
    /// `"g"` or `"d"`.
    pub fn state(&self, net: &str) -> Vec<(String, Tensor)> {
        match self {
            TagProjector::Single(proj) => proj.state(&format!("{net}_embedding")),
            TagProjector::Split { hair, eyes } => {
                let mut state = hair.state(&format!("{net}_hair_embedding"));
                state.extend(eyes.state(&format!("{net}_eyes_embedding")));
                state
            }
        }
    }
}
