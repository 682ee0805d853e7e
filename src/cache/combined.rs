use std::path::{Path, PathBuf};

use super::io::{ensure_dir, entry_path, read_entry, write_entry};
use crate::data::model::Sample;
use crate::error::Result;

/// Per-sample entries holding the full concatenated vector and its label,
/// one file per molecule inside the selection's cache folder.
#[derive(Debug, Clone)]
pub struct CombinedCache {
    dir: PathBuf,
}

impl CombinedCache {
    /// Opens (creating if needed) the cache folder.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(CombinedCache { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, id: &str) -> Result<Option<Sample>> {
        let path = entry_path(&self.dir, id)?;
        let entry: Option<(Vec<f32>, Vec<f32>)> = read_entry(&path)?;
        Ok(entry.map(|(features, label)| Sample { features, label }))
    }

    pub fn store(&self, id: &str, sample: &Sample) -> Result<()> {
        let path = entry_path(&self.dir, id)?;
        write_entry(&path, &(&sample.features, &sample.label))
    }

    /// Remove one entry; the only way a stale label is dropped.
    pub fn invalidate(&self, id: &str) -> Result<bool> {
        let path = entry_path(&self.dir, id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(crate::error::DescriptorError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load_preserves_bits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CombinedCache::open(dir.path().join("abc")).unwrap();
        assert!(cache.load("m1").unwrap().is_none());

        let sample = Sample::new(vec![0.1, -2.0, 1e-30], f32::NAN);
        cache.store("m1", &sample).unwrap();
        let back = cache.load("m1").unwrap().unwrap();
        assert!(back.bit_eq(&sample));
    }

    #[test]
    fn invalidate_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CombinedCache::open(dir.path()).unwrap();
        cache.store("m1", &Sample::new(vec![1.0], 2.0)).unwrap();
        assert!(cache.invalidate("m1").unwrap());
        assert!(!cache.invalidate("m1").unwrap());
        assert!(cache.load("m1").unwrap().is_none());
    }
}
