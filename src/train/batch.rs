//! Per-step batch assembly: sequential image slices, paired tags, fresh
//! mismatched tags, and fresh noise.

use rand::Rng;

use crate::autograd::Tensor;
use crate::data::{ImageSource, TagStore};
use crate::error::Result;
use crate::gan::ModelConfig;

/// One training step's inputs. Everything is a plain constant to the
/// networks.
pub struct TrainBatch {
    pub images: Tensor,
    pub tags: Tensor,
    pub wrong_tags: Tensor,
    pub noise: Tensor,
}

/// Batches per epoch: full batches over the capped example count, no
/// partial batch.
#[must_use]
pub fn batch_count(available: usize, train_size: Option<usize>, batch_size: usize) -> usize {
    let limit = train_size.map_or(available, |cap| available.min(cap));
    limit / batch_size
}

/// Noise values drawn i.i.d. uniform from [-1,1].
pub fn uniform_noise<R: Rng>(rng: &mut R, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect()
}

pub struct BatchAssembler<'a> {
    source: &'a ImageSource,
    store: &'a TagStore,
    config: &'a ModelConfig,
}

impl<'a> BatchAssembler<'a> {
    pub fn new(source: &'a ImageSource, store: &'a TagStore, config: &'a ModelConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Images and paired tags for batch `batch_index`, taken sequentially
    /// from the identifier-sorted listing.
    pub fn paired(&self, batch_index: usize) -> Result<(Tensor, Tensor)> {
        let batch = self.config.batch_size;
        let from = batch_index * batch;
        let images = self.source.load_batch(from, batch)?;

        let mut tags = Vec::with_capacity(batch * self.config.y_dim);
        for i in from..from + batch {
            tags.extend(self.store.vector(self.source.id(i))?);
        }
        Ok((
            Tensor::from_vec(images, false),
            Tensor::from_vec(tags, false),
        ))
    }

    /// A fresh mismatched-tag draw: one uniformly chosen identifier per
    /// example, or two independent choices per example for the two halves
    /// in two-part mode.
    pub fn wrong_tags<R: Rng>(&self, rng: &mut R) -> Result<Tensor> {
        let batch = self.config.batch_size;
        let mut tags = Vec::with_capacity(batch * self.config.y_dim);
        for _ in 0..batch {
            if self.store.is_split() {
                let first = self.source.id(rng.random_range(0..self.source.len()));
                let second = self.source.id(rng.random_range(0..self.source.len()));
                tags.extend(self.store.compose(first, second)?);
            } else {
                let id = self.source.id(rng.random_range(0..self.source.len()));
                tags.extend(self.store.vector(id)?);
            }
        }
        Ok(Tensor::from_vec(tags, false))
    }

    /// Fresh noise for one batch.
    pub fn noise<R: Rng>(&self, rng: &mut R) -> Tensor {
        Tensor::from_vec(
            uniform_noise(rng, self.config.batch_size * self.config.z_dim),
            false,
        )
    }

    /// Full batch with fresh random draws; images and paired tags are
    /// deterministic per index.
    pub fn assemble<R: Rng>(&self, rng: &mut R, batch_index: usize) -> Result<TrainBatch> {
        let (images, tags) = self.paired(batch_index)?;
        let wrong_tags = self.wrong_tags(rng)?;
        let noise = self.noise(rng);
        Ok(TrainBatch {
            images,
            tags,
            wrong_tags,
            noise,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile, TempDir};

    #[test]
    fn test_batch_count_caps_and_floors() {
        assert_eq!(batch_count(128, None, 64), 2);
        assert_eq!(batch_count(130, None, 64), 2);
        assert_eq!(batch_count(1000, Some(128), 64), 2);
        assert_eq!(batch_count(100, Some(128), 64), 1);
        assert_eq!(batch_count(63, None, 64), 0);
    }

    proptest! {
        #[test]
        fn prop_batch_count_never_overruns(
            available in 0usize..10_000,
            cap in proptest::option::of(0usize..10_000),
            batch in 1usize..512,
        ) {
            let count = batch_count(available, cap, batch);
            prop_assert!(count * batch <= available);
            if let Some(cap) = cap {
                prop_assert!(count * batch <= cap);
            }
        }
    }

    #[test]
    fn test_uniform_noise_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let noise = uniform_noise(&mut rng, 1000);
        assert!(noise.iter().all(|&v| (-1.0..=1.0).contains(&v)));
        assert!(noise.iter().any(|&v| v < -0.5));
        assert!(noise.iter().any(|&v| v > 0.5));
    }

    fn tiny_dataset(config: &ModelConfig, count: usize) -> (TempDir, NamedTempFile) {
        let dir = tempdir().unwrap();
        let mut map: HashMap<String, Vec<f32>> = HashMap::new();
        for id in 0..count {
            let img = image::GrayImage::from_pixel(
                config.output_width as u32,
                config.output_height as u32,
                image::Luma([(id * 40) as u8]),
            );
            img.save(dir.path().join(format!("{id}.png"))).unwrap();
            let mut tag = vec![0.0; config.y_dim];
            tag[id % config.y_dim] = 1.0;
            map.insert(id.to_string(), tag);
        }
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&map).unwrap()).unwrap();
        (dir, file)
    }

    #[test]
    fn test_paired_batches_slice_sequentially() {
        let mut config = ModelConfig::tiny();
        config.file_pattern = "*.png".to_string();
        let (dir, tag_file) = tiny_dataset(&config, 5);
        let store = TagStore::load(tag_file.path(), None, config.y_dim).unwrap();
        let source = ImageSource::scan(
            dir.path(),
            &config.file_pattern,
            config.output_height,
            config.output_width,
            config.c_dim,
            &store,
        )
        .unwrap();
        let assembler = BatchAssembler::new(&source, &store, &config);

        let (images0, tags0) = assembler.paired(0).unwrap();
        let (_, tags1) = assembler.paired(1).unwrap();
        assert_eq!(images0.len(), config.batch_size * config.image_len());
        assert_eq!(tags0.len(), config.batch_size * config.y_dim);
        // batch 0 holds ids 0,1 and batch 1 holds ids 2,3
        assert_eq!(tags0.data()[0], 1.0);
        assert_eq!(tags1.data()[2], 1.0);
    }

    #[test]
    fn test_wrong_tags_are_valid_vectors() {
        let mut config = ModelConfig::tiny();
        config.file_pattern = "*.png".to_string();
        let (dir, tag_file) = tiny_dataset(&config, 4);
        let store = TagStore::load(tag_file.path(), None, config.y_dim).unwrap();
        let source = ImageSource::scan(
            dir.path(),
            &config.file_pattern,
            config.output_height,
            config.output_width,
            config.c_dim,
            &store,
        )
        .unwrap();
        let assembler = BatchAssembler::new(&source, &store, &config);

        let mut rng = StdRng::seed_from_u64(7);
        let wrong = assembler.wrong_tags(&mut rng).unwrap();
        assert_eq!(wrong.len(), config.batch_size * config.y_dim);
        for example in wrong.to_vec().chunks(config.y_dim) {
            assert_eq!(example.iter().filter(|&&v| v == 1.0).count(), 1);
        }
    }

    #[test]
    fn test_assemble_draws_fresh_noise() {
        let mut config = ModelConfig::tiny();
        config.file_pattern = "*.png".to_string();
        let (dir, tag_file) = tiny_dataset(&config, 4);
        let store = TagStore::load(tag_file.path(), None, config.y_dim).unwrap();
        let source = ImageSource::scan(
            dir.path(),
            &config.file_pattern,
            config.output_height,
            config.output_width,
            config.c_dim,
            &store,
        )
        .unwrap();
        let assembler = BatchAssembler::new(&source, &store, &config);

        let mut rng = StdRng::seed_from_u64(8);
        let a = assembler.assemble(&mut rng, 0).unwrap();
        let b = assembler.assemble(&mut rng, 0).unwrap();
        assert_eq!(a.images.to_vec(), b.images.to_vec());
        assert_eq!(a.tags.to_vec(), b.tags.to_vec());
        assert_ne!(a.noise.to_vec(), b.noise.to_vec());
    }
}
