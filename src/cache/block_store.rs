use std::path::{Path, PathBuf};

use super::io::{ensure_dir, entry_path, read_entry, write_entry};
use crate::error::Result;

/// Folder (under the data root) holding per-block file caches.
pub const BLOCK_CACHE_DIR: &str = "modular_repr_cache";

/// Persistence for individual descriptor blocks, keyed by block name and
/// molecule id. Stores are consulted in order before a block is computed.
pub trait BlockStore {
    /// Short tier name for log records.
    fn tier(&self) -> &'static str;

    fn load(&mut self, block: &str, id: &str) -> Result<Option<Vec<f32>>>;

    fn store(&mut self, block: &str, id: &str, values: &[f32]) -> Result<()>;

    /// Make buffered writes durable.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One bincode file per (block, molecule):
/// `<dataRoot>/modular_repr_cache/<BlockName>/<id>.cache`.
#[derive(Debug, Clone)]
pub struct BlockFileCache {
    root: PathBuf,
}

impl BlockFileCache {
    pub fn new(data_root: &Path) -> Self {
        BlockFileCache {
            root: data_root.join(BLOCK_CACHE_DIR),
        }
    }

    pub fn block_dir(&self, block: &str) -> PathBuf {
        self.root.join(block)
    }
}

impl BlockStore for BlockFileCache {
    fn tier(&self) -> &'static str {
        "block-file"
    }

    fn load(&mut self, block: &str, id: &str) -> Result<Option<Vec<f32>>> {
        read_entry(&entry_path(&self.block_dir(block), id)?)
    }

    fn store(&mut self, block: &str, id: &str, values: &[f32]) -> Result<()> {
        let dir = self.block_dir(block);
        ensure_dir(&dir)?;
        write_entry(&entry_path(&dir, id)?, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_layout_uses_block_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockFileCache::new(dir.path());
        assert!(store.load("MACCS", "m1").unwrap().is_none());
        store.store("MACCS", "m1", &[1.0, 0.0, 1.0]).unwrap();

        assert!(dir.path().join("modular_repr_cache/MACCS/m1.cache").is_file());
        assert_eq!(store.load("MACCS", "m1").unwrap().unwrap(), vec![1.0, 0.0, 1.0]);
        assert!(store.load("MQN", "m1").unwrap().is_none());
    }
}
