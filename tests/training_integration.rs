//! End-to-end training runs on a tiny synthetic dataset.
//!
//! Exercises the full pipeline for each objective variant: tag and image
//! loading, batch assembly, parameter updates, the step counter's sampling
//! and checkpoint cadence, and resumption from a saved snapshot.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use retratar::checkpoint::CheckpointManager;
use retratar::gan::SPLIT_TAG_WIDTH;
use retratar::{CondGan, ModelConfig, TrainOptions, Trainer, Variant};

/// Write `count` grayscale images named `<id>.png` plus a one-hot tag file.
fn tiny_fixtures(root: &Path, config: &ModelConfig, count: usize) -> (PathBuf, PathBuf) {
    let data_dir = root.join("images");
    fs::create_dir_all(&data_dir).unwrap();
    let mut map: HashMap<String, Vec<f32>> = HashMap::new();
    for id in 0..count {
        let img = image::GrayImage::from_pixel(
            config.output_width as u32,
            config.output_height as u32,
            image::Luma([(id * 50) as u8]),
        );
        img.save(data_dir.join(format!("{id}.png"))).unwrap();
        let mut tag = vec![0.0; config.y_dim];
        tag[id % config.y_dim] = 1.0;
        map.insert(id.to_string(), tag);
    }
    let tag_path = root.join("tags.json");
    fs::write(&tag_path, serde_json::to_string(&map).unwrap()).unwrap();
    (data_dir, tag_path)
}

fn test_options(root: &Path, data_dir: PathBuf, tag_path: PathBuf, seed: u64) -> TrainOptions {
    TrainOptions {
        learning_rate: 0.0002,
        beta1: 0.5,
        epoch: 1,
        train_size: None,
        init_from: None,
        data_dir,
        tag_path,
        tag_path_special: None,
        save_dir: root.join("save"),
        sample_dir: root.join("samples"),
        seed: Some(seed),
    }
}

fn tiny_config() -> ModelConfig {
    let mut config = ModelConfig::tiny();
    config.file_pattern = "*.png".to_string();
    config
}

#[test]
fn test_standard_two_batch_run() {
    let root = TempDir::new().unwrap();
    let config = tiny_config();
    let (data_dir, tag_path) = tiny_fixtures(root.path(), &config, 4);
    let options = test_options(root.path(), data_dir, tag_path, 3);

    let mut trainer = Trainer::new(Variant::Standard, config.clone(), options).unwrap();
    let before = trainer.model().g_params()[0].to_vec();
    trainer.train().unwrap();
    let after = trainer.model().g_params()[0].to_vec();
    assert_ne!(before, after, "generator parameters should move");

    // Four images at batch size two is two steps; the counter runs 1 -> 3.
    // The checkpoint hook fires once, at counter 2, after the first step.
    let run_dir = root.path().join("save").join("tiny_2_8_8");
    assert!(
        run_dir.join("DCGAN.model-2").exists(),
        "snapshot at step 2 should exist"
    );
    let pointer = fs::read_to_string(run_dir.join("latest")).unwrap();
    assert_eq!(pointer.trim(), "DCGAN.model-2");

    let err_d: Vec<f32> =
        serde_json::from_str(&fs::read_to_string(run_dir.join("errD_list.json")).unwrap()).unwrap();
    let err_g: Vec<f32> =
        serde_json::from_str(&fs::read_to_string(run_dir.join("errG_list.json")).unwrap()).unwrap();
    assert_eq!(err_d.len(), 1, "history is written as of the checkpoint");
    assert_eq!(err_g.len(), 1);
    assert!(err_d[0].is_finite() && err_g[0].is_finite());

    // The sampler first fires at counter 501, far past this run.
    assert!(!root.path().join("samples").exists());
}

#[test]
fn test_resume_reaches_sampler_cadence() {
    let root = TempDir::new().unwrap();
    let config = tiny_config();
    let (data_dir, tag_path) = tiny_fixtures(root.path(), &config, 2);

    // Seed a snapshot at step 500 so the first resumed step lands on 501,
    // the sampler's cadence point.
    let manager = CheckpointManager::new(&root.path().join("save"), &config, Variant::Standard);
    let mut rng = StdRng::seed_from_u64(11);
    let donor = CondGan::new(&mut rng, Variant::Standard, &config).unwrap();
    manager.save(&donor, 500).unwrap();

    let mut options = test_options(root.path(), data_dir, tag_path, 4);
    options.init_from = Some(manager.run_dir().to_path_buf());
    let mut trainer = Trainer::new(Variant::Standard, config.clone(), options).unwrap();
    trainer.train().unwrap();

    let grid_path = root.path().join("samples").join("train_00_0000.png");
    assert!(grid_path.exists(), "sampler should write a grid at step 501");
    let grid = image::open(&grid_path).unwrap();
    // Two tiles stack into ceil(sqrt 2) = 2 rows by floor(sqrt 2) = 1 column.
    assert_eq!(grid.width(), config.output_width as u32);
    assert_eq!(grid.height(), 2 * config.output_height as u32);

    // 501 is not a checkpoint step, so the seed snapshot stays the latest.
    let pointer = fs::read_to_string(manager.run_dir().join("latest")).unwrap();
    assert_eq!(pointer.trim(), "DCGAN.model-500");
}

#[test]
fn test_wgan_clip_bounds_critic_weights() {
    let root = TempDir::new().unwrap();
    let config = tiny_config();
    let (data_dir, tag_path) = tiny_fixtures(root.path(), &config, 2);
    let options = test_options(root.path(), data_dir, tag_path, 5);

    let mut trainer = Trainer::new(Variant::WganClip, config.clone(), options).unwrap();
    trainer.train().unwrap();

    for param in trainer.model().d_params() {
        for value in param.to_vec() {
            assert!(
                (-config.clip_value..=config.clip_value).contains(&value),
                "critic weight {value} escaped the clip bound"
            );
        }
    }
}

#[test]
fn test_wgan_gp_checkpoints_first_step() {
    let root = TempDir::new().unwrap();
    let config = tiny_config();
    let (data_dir, tag_path) = tiny_fixtures(root.path(), &config, 2);
    let options = test_options(root.path(), data_dir, tag_path, 6);

    let mut trainer = Trainer::new(Variant::WganGp, config.clone(), options).unwrap();
    trainer.train().unwrap();

    let run_dir = root.path().join("save").join("tiny_2_8_8");
    assert!(run_dir.join("WGAN_v2.model-2").exists());
    let err_d: Vec<f32> =
        serde_json::from_str(&fs::read_to_string(run_dir.join("errD_list.json")).unwrap()).unwrap();
    assert_eq!(err_d.len(), 1);
    assert!(err_d[0].is_finite(), "penalty term should stay finite");
}

#[test]
fn test_split_tags_train_and_round_trip() {
    let root = TempDir::new().unwrap();
    let mut config = tiny_config();
    config.y_dim = SPLIT_TAG_WIDTH;

    let data_dir = root.path().join("images");
    fs::create_dir_all(&data_dir).unwrap();
    let half = SPLIT_TAG_WIDTH / 2;
    let mut primary: HashMap<String, Vec<f32>> = HashMap::new();
    let mut secondary: HashMap<String, Vec<f32>> = HashMap::new();
    for id in 0..2usize {
        let img = image::GrayImage::from_pixel(
            config.output_width as u32,
            config.output_height as u32,
            image::Luma([(id * 90) as u8]),
        );
        img.save(data_dir.join(format!("{id}.png"))).unwrap();
        let mut first = vec![0.0; half];
        first[id] = 1.0;
        primary.insert(id.to_string(), first);
        let mut second = vec![0.0; half];
        second[id + 1] = 1.0;
        secondary.insert(id.to_string(), second);
    }
    let tag_path = root.path().join("hair.json");
    let special_path = root.path().join("eyes.json");
    fs::write(&tag_path, serde_json::to_string(&primary).unwrap()).unwrap();
    fs::write(&special_path, serde_json::to_string(&secondary).unwrap()).unwrap();

    let mut options = test_options(root.path(), data_dir, tag_path, 7);
    options.tag_path_special = Some(special_path);

    let mut trainer = Trainer::new(Variant::WganGp, config.clone(), options).unwrap();
    trainer.train().unwrap();

    // One batch advances the counter to 2 and snapshots the two-part
    // embedding; restoring it into a fresh model must succeed.
    let run_dir = root.path().join("save").join("tiny_2_8_8");
    assert!(run_dir.join("WGAN_v2.model-2").exists());
    let mut rng = StdRng::seed_from_u64(12);
    let mut fresh = CondGan::new(&mut rng, Variant::WganGp, &config).unwrap();
    let step = CheckpointManager::restore(&run_dir, &mut fresh).unwrap();
    assert_eq!(step, 2);
}
