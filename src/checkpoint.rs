//! Checkpoint persistence: parameter snapshots, the latest pointer, and
//! loss-history files.
//!
//! A run owns one subdirectory named `<dataset>_<batch>_<height>_<width>`
//! under the save root. Snapshots are self-describing JSON files named
//! `<model_name>.model-<step>`; the step parses back out of the filename on
//! restore. Old snapshots are never evicted.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gan::{CondGan, ModelConfig, Variant};

const LATEST_POINTER: &str = "latest";
const D_LOSS_FILE: &str = "errD_list.json";
const G_LOSS_FILE: &str = "errG_list.json";

#[derive(Serialize, Deserialize)]
struct ManifestEntry {
    name: String,
    len: usize,
    offset: usize,
}

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    model_name: String,
    step: usize,
    manifest: Vec<ManifestEntry>,
    data: Vec<f32>,
}

pub struct CheckpointManager {
    run_dir: PathBuf,
    model_name: String,
}

impl CheckpointManager {
    pub fn new(save_dir: &Path, config: &ModelConfig, variant: Variant) -> Self {
        let run_dir = save_dir.join(format!(
            "{}_{}_{}_{}",
            config.dataset, config.batch_size, config.output_height, config.output_width
        ));
        Self {
            run_dir,
            model_name: variant.model_name().to_string(),
        }
    }

    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Persists every model tensor under the given step and points `latest`
    /// at the new file. Earlier snapshots stay on disk.
    pub fn save(&self, model: &CondGan, step: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.run_dir)?;

        let mut manifest = Vec::new();
        let mut data = Vec::new();
        for (name, tensor) in model.state() {
            manifest.push(ManifestEntry {
                name,
                len: tensor.len(),
                offset: data.len(),
            });
            data.extend(tensor.to_vec());
        }

        let file_name = format!("{}.model-{step}", self.model_name);
        let path = self.run_dir.join(&file_name);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(
            writer,
            &CheckpointFile {
                model_name: self.model_name.clone(),
                step,
                manifest,
                data,
            },
        )
        .map_err(|e| Error::Serialization(format!("cannot write {}: {e}", path.display())))?;

        fs::write(self.run_dir.join(LATEST_POINTER), &file_name)?;
        Ok(path)
    }

    /// Restores the newest snapshot under `dir` into `model` and returns
    /// the step parsed from its filename. Nothing is mutated on failure.
    pub fn restore(dir: &Path, model: &mut CondGan) -> Result<usize> {
        let pointer = fs::read_to_string(dir.join(LATEST_POINTER)).map_err(|e| {
            Error::Checkpoint(format!("no latest pointer under {}: {e}", dir.display()))
        })?;
        let file_name = pointer.trim();
        if file_name.is_empty() {
            return Err(Error::Checkpoint(format!(
                "empty latest pointer under {}",
                dir.display()
            )));
        }
        let step = file_name
            .rsplit_once('-')
            .and_then(|(_, s)| s.parse::<usize>().ok())
            .ok_or_else(|| {
                Error::Checkpoint(format!("no step suffix in checkpoint name {file_name:?}"))
            })?;

        let path = dir.join(file_name);
        let reader = BufReader::new(File::open(&path).map_err(|e| {
            Error::Checkpoint(format!("cannot open {}: {e}", path.display()))
        })?);
        let file: CheckpointFile = serde_json::from_reader(reader)
            .map_err(|e| Error::Serialization(format!("cannot parse {}: {e}", path.display())))?;

        let mut entries = HashMap::with_capacity(file.manifest.len());
        for entry in &file.manifest {
            let end = entry.offset + entry.len;
            if end > file.data.len() {
                return Err(Error::Checkpoint(format!(
                    "tensor {} overruns checkpoint data ({} > {})",
                    entry.name,
                    end,
                    file.data.len()
                )));
            }
            entries.insert(entry.name.clone(), file.data[entry.offset..end].to_vec());
        }
        model.load_state(&entries)?;
        Ok(step)
    }

    /// Overwrites both loss-history files with the full sequences.
    pub fn write_loss_history(&self, err_d: &[f32], err_g: &[f32]) -> Result<()> {
        fs::create_dir_all(&self.run_dir)?;
        for (file_name, values) in [(D_LOSS_FILE, err_d), (G_LOSS_FILE, err_g)] {
            let writer = BufWriter::new(File::create(self.run_dir.join(file_name))?);
            serde_json::to_writer(writer, values).map_err(|e| {
                Error::Serialization(format!("cannot write {file_name}: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn tiny_model(seed: u64) -> CondGan {
        let config = ModelConfig::tiny();
        let mut rng = StdRng::seed_from_u64(seed);
        CondGan::new(&mut rng, Variant::Standard, &config).unwrap()
    }

    #[test]
    fn test_save_restore_round_trip() {
        let dir = tempdir().unwrap();
        let model = tiny_model(0);
        let manager = CheckpointManager::new(dir.path(), &model.config, model.variant);
        manager.save(&model, 42).unwrap();

        let saved: Vec<(String, Vec<f32>)> = model
            .state()
            .into_iter()
            .map(|(n, t)| (n, t.to_vec()))
            .collect();

        let mut other = tiny_model(99);
        let step = CheckpointManager::restore(manager.run_dir(), &mut other).unwrap();
        assert_eq!(step, 42);
        for (name, values) in saved {
            let restored = other
                .state()
                .into_iter()
                .find(|(n, _)| *n == name)
                .unwrap()
                .1;
            assert_eq!(restored.to_vec(), values, "mismatch for {name}");
        }
    }

    #[test]
    fn test_latest_pointer_tracks_newest() {
        let dir = tempdir().unwrap();
        let model = tiny_model(1);
        let manager = CheckpointManager::new(dir.path(), &model.config, model.variant);
        let first = manager.save(&model, 2).unwrap();
        let second = manager.save(&model, 4).unwrap();
        assert!(first.exists(), "older snapshots must stay on disk");
        assert!(second.exists());

        let mut other = tiny_model(2);
        let step = CheckpointManager::restore(manager.run_dir(), &mut other).unwrap();
        assert_eq!(step, 4);
    }

    #[test]
    fn test_restore_missing_dir_leaves_model() {
        let dir = tempdir().unwrap();
        let mut model = tiny_model(3);
        let before: Vec<Vec<f32>> = model.state().iter().map(|(_, t)| t.to_vec()).collect();
        let missing = dir.path().join("nowhere");
        assert!(CheckpointManager::restore(&missing, &mut model).is_err());
        let after: Vec<Vec<f32>> = model.state().iter().map(|(_, t)| t.to_vec()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_restore_rejects_bad_step_suffix() {
        let dir = tempdir().unwrap();
        let model = tiny_model(4);
        let manager = CheckpointManager::new(dir.path(), &model.config, model.variant);
        manager.save(&model, 1).unwrap();
        fs::write(manager.run_dir().join(LATEST_POINTER), "DCGAN.model-xyz").unwrap();
        let mut other = tiny_model(5);
        assert!(CheckpointManager::restore(manager.run_dir(), &mut other).is_err());
    }

    #[test]
    fn test_run_dir_name() {
        let dir = tempdir().unwrap();
        let config = ModelConfig::tiny();
        let manager = CheckpointManager::new(dir.path(), &config, Variant::WganGp);
        let name = manager.run_dir().file_name().unwrap().to_str().unwrap();
        assert_eq!(
            name,
            format!(
                "{}_{}_{}_{}",
                config.dataset, config.batch_size, config.output_height, config.output_width
            )
        );
    }

    #[test]
    fn test_loss_history_overwritten() {
        let dir = tempdir().unwrap();
        let model = tiny_model(6);
        let manager = CheckpointManager::new(dir.path(), &model.config, model.variant);
        manager.write_loss_history(&[1.0, 2.0], &[3.0]).unwrap();
        manager.write_loss_history(&[5.0], &[6.0, 7.0]).unwrap();

        let d: Vec<f32> = serde_json::from_str(
            &fs::read_to_string(manager.run_dir().join(D_LOSS_FILE)).unwrap(),
        )
        .unwrap();
        let g: Vec<f32> = serde_json::from_str(
            &fs::read_to_string(manager.run_dir().join(G_LOSS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(d, vec![5.0]);
        assert_eq!(g, vec![6.0, 7.0]);
    }
}
