//! Tag vector storage keyed by image identifier.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::gan::config::SPLIT_TAG_WIDTH;

/// Identifier-to-tag-vector mappings loaded once from JSON.
///
/// In the two-part mode (full width 9600) a secondary file supplies the
/// second half of every vector and the served vector is the concatenation
/// of both lookups. Every entry is validated at load; lookups afterwards
/// only fail for identifiers absent from the files.
pub struct TagStore {
    primary: HashMap<usize, Vec<f32>>,
    secondary: Option<HashMap<usize, Vec<f32>>>,
    width: usize,
}

fn read_tag_file(path: &Path, expected_width: usize) -> Result<HashMap<usize, Vec<f32>>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::TagStore(format!("cannot read {}: {e}", path.display())))?;
    let raw: HashMap<String, Vec<f32>> = serde_json::from_str(&text)
        .map_err(|e| Error::TagStore(format!("cannot parse {}: {e}", path.display())))?;

    let mut tags = HashMap::with_capacity(raw.len());
    for (key, vector) in raw {
        let id: usize = key.parse().map_err(|_| {
            Error::TagStore(format!("non-integer identifier {key:?} in {}", path.display()))
        })?;
        if vector.len() != expected_width {
            return Err(Error::TagStore(format!(
                "tag {id} in {} has width {}, expected {expected_width}",
                path.display(),
                vector.len()
            )));
        }
        tags.insert(id, vector);
    }
    if tags.is_empty() {
        return Err(Error::TagStore(format!("{} holds no tags", path.display())));
    }
    Ok(tags)
}

impl TagStore {
    /// Loads the primary file, and the secondary file when `y_dim` selects
    /// the two-part mode. Widths are checked entry by entry.
    pub fn load(primary: &Path, secondary: Option<&Path>, y_dim: usize) -> Result<Self> {
        if y_dim == SPLIT_TAG_WIDTH {
            let secondary_path = secondary.ok_or_else(|| {
                Error::Config(format!(
                    "tag width {SPLIT_TAG_WIDTH} needs a secondary tag file"
                ))
            })?;
            let half = y_dim / 2;
            Ok(Self {
                primary: read_tag_file(primary, half)?,
                secondary: Some(read_tag_file(secondary_path, half)?),
                width: y_dim,
            })
        } else {
            Ok(Self {
                primary: read_tag_file(primary, y_dim)?,
                secondary: None,
                width: y_dim,
            })
        }
    }

    /// Full tag vector for one identifier; concatenated halves in two-part
    /// mode.
    pub fn vector(&self, id: usize) -> Result<Vec<f32>> {
        let first = self
            .primary
            .get(&id)
            .ok_or_else(|| Error::TagStore(format!("no tag entry for identifier {id}")))?;
        match &self.secondary {
            None => Ok(first.clone()),
            Some(secondary) => {
                let second = secondary.get(&id).ok_or_else(|| {
                    Error::TagStore(format!("no secondary tag entry for identifier {id}"))
                })?;
                let mut full = first.clone();
                full.extend_from_slice(second);
                Ok(full)
            }
        }
    }

    /// Two-part vector built from independently chosen identifiers, for
    /// mismatched-tag batches in two-part mode.
    pub fn compose(&self, primary_id: usize, secondary_id: usize) -> Result<Vec<f32>> {
        let secondary = self
            .secondary
            .as_ref()
            .expect("compose is only meaningful in two-part mode");
        let first = self.primary.get(&primary_id).ok_or_else(|| {
            Error::TagStore(format!("no tag entry for identifier {primary_id}"))
        })?;
        let second = secondary.get(&secondary_id).ok_or_else(|| {
            Error::TagStore(format!("no secondary tag entry for identifier {secondary_id}"))
        })?;
        let mut full = first.clone();
        full.extend_from_slice(second);
        Ok(full)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.primary.contains_key(&id)
            && self.secondary.as_ref().is_none_or(|s| s.contains_key(&id))
    }

    #[must_use]
    pub fn is_split(&self) -> bool {
        self.secondary.is_some()
    }

    /// Width of the vectors served by [`TagStore::vector`].
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn tag_file(entries: &[(usize, Vec<f32>)]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let map: HashMap<String, Vec<f32>> = entries
            .iter()
            .map(|(id, v)| (id.to_string(), v.clone()))
            .collect();
        write!(file, "{}", serde_json::to_string(&map).unwrap()).unwrap();
        file
    }

    #[test]
    fn test_single_mode_lookup() {
        let file = tag_file(&[(0, vec![1.0, 0.0, 1.0]), (7, vec![0.0, 1.0, 0.0])]);
        let store = TagStore::load(file.path(), None, 3).unwrap();
        assert!(!store.is_split());
        assert_eq!(store.len(), 2);
        assert_eq!(store.vector(7).unwrap(), vec![0.0, 1.0, 0.0]);
        assert!(store.vector(3).is_err());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let file = tag_file(&[(0, vec![1.0, 0.0])]);
        assert!(TagStore::load(file.path(), None, 3).is_err());
    }

    #[test]
    fn test_split_mode_requires_secondary() {
        let file = tag_file(&[(0, vec![0.0; SPLIT_TAG_WIDTH / 2])]);
        let err = TagStore::load(file.path(), None, SPLIT_TAG_WIDTH);
        assert!(err.is_err());
    }

    #[test]
    fn test_split_mode_concatenates_in_order() {
        let primary = tag_file(&[(0, vec![1.0; SPLIT_TAG_WIDTH / 2])]);
        let secondary = tag_file(&[(0, vec![2.0; SPLIT_TAG_WIDTH / 2])]);
        let store =
            TagStore::load(primary.path(), Some(secondary.path()), SPLIT_TAG_WIDTH).unwrap();
        assert!(store.is_split());
        let v = store.vector(0).unwrap();
        assert_eq!(v.len(), SPLIT_TAG_WIDTH);
        assert_eq!(v[0], 1.0);
        assert_eq!(v[SPLIT_TAG_WIDTH - 1], 2.0);
    }

    #[test]
    fn test_compose_mixes_identifiers() {
        let primary = tag_file(&[(0, vec![1.0; SPLIT_TAG_WIDTH / 2]), (1, vec![3.0; SPLIT_TAG_WIDTH / 2])]);
        let secondary = tag_file(&[(0, vec![2.0; SPLIT_TAG_WIDTH / 2]), (1, vec![4.0; SPLIT_TAG_WIDTH / 2])]);
        let store =
            TagStore::load(primary.path(), Some(secondary.path()), SPLIT_TAG_WIDTH).unwrap();
        let v = store.compose(0, 1).unwrap();
        assert_eq!(v[0], 1.0);
        assert_eq!(v[SPLIT_TAG_WIDTH - 1], 4.0);
    }

    #[test]
    fn test_malformed_json_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(TagStore::load(file.path(), None, 3).is_err());
    }

    #[test]
    fn test_non_integer_key_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", r#"{"abc": [1.0, 0.0, 0.0]}"#).unwrap();
        assert!(TagStore::load(file.path(), None, 3).is_err());
    }
}
