//! Dataset directory listing and image decoding.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;

use crate::error::{Error, Result};

use super::tags::TagStore;

/// Identifier-sorted listing of a dataset directory.
///
/// File basenames are integer identifiers; every identifier must resolve in
/// the tag store before training starts. Decoding and resizing happen per
/// batch on demand, producing NHWC values in [0,1].
pub struct ImageSource {
    entries: Vec<(usize, PathBuf)>,
    out_h: usize,
    out_w: usize,
    c_dim: usize,
}

impl ImageSource {
    /// Lists `dir` by the extension of `pattern` (for example `*.jpg`),
    /// sorts by identifier, and checks every identifier against `store`.
    pub fn scan(
        dir: &Path,
        pattern: &str,
        out_h: usize,
        out_w: usize,
        c_dim: usize,
        store: &TagStore,
    ) -> Result<Self> {
        if c_dim != 1 && c_dim != 3 {
            return Err(Error::Config(format!("unsupported channel count {c_dim}")));
        }
        let ext = pattern.strip_prefix("*.").ok_or_else(|| {
            Error::Config(format!("file pattern {pattern:?} must look like *.ext"))
        })?;

        let mut entries = Vec::new();
        let listing = fs::read_dir(dir)
            .map_err(|e| Error::Dataset(format!("cannot list {}: {e}", dir.display())))?;
        for entry in listing {
            let path = entry
                .map_err(|e| Error::Dataset(format!("cannot list {}: {e}", dir.display())))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let id: usize = stem.parse().map_err(|_| {
                Error::Dataset(format!(
                    "basename {stem:?} of {} is not an integer identifier",
                    path.display()
                ))
            })?;
            if !store.contains(id) {
                return Err(Error::Dataset(format!(
                    "identifier {id} ({}) has no tag entry",
                    path.display()
                )));
            }
            entries.push((id, path));
        }
        if entries.is_empty() {
            return Err(Error::Dataset(format!(
                "no {pattern} files under {}",
                dir.display()
            )));
        }
        entries.sort_by_key(|(id, _)| *id);

        Ok(Self {
            entries,
            out_h,
            out_w,
            c_dim,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifier of the example at a listing position.
    #[must_use]
    pub fn id(&self, index: usize) -> usize {
        self.entries[index].0
    }

    /// Decodes and resizes `count` consecutive examples starting at `from`,
    /// flattened NHWC.
    pub fn load_batch(&self, from: usize, count: usize) -> Result<Vec<f32>> {
        if from + count > self.entries.len() {
            return Err(Error::Dataset(format!(
                "batch [{from}, {}) overruns the {} listed examples",
                from + count,
                self.entries.len()
            )));
        }
        let mut out = Vec::with_capacity(count * self.out_h * self.out_w * self.c_dim);
        for (_, path) in &self.entries[from..from + count] {
            let decoded = image::open(path)?.resize_exact(
                self.out_w as u32,
                self.out_h as u32,
                FilterType::Triangle,
            );
            match self.c_dim {
                1 => out.extend(decoded.to_luma8().into_raw().iter().map(|&b| f32::from(b) / 255.0)),
                _ => out.extend(decoded.to_rgb8().into_raw().iter().map(|&b| f32::from(b) / 255.0)),
            }
        }
        Ok(out)
    }
}
