use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DescriptorError, Result};

pub const CACHE_EXTENSION: &str = "cache";

/// Create `path` and its parents. Pre-existence is fine.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| DescriptorError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Molecule ids become file stems verbatim.
pub fn check_entry_id(id: &str) -> Result<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
        return Err(DescriptorError::InvalidMoleculeId(id.to_string()));
    }
    Ok(())
}

pub fn entry_path(dir: &Path, id: &str) -> Result<PathBuf> {
    check_entry_id(id)?;
    Ok(dir.join(format!("{id}.{CACHE_EXTENSION}")))
}

/// Write via a temp file in the same directory and rename over `path`, so
/// readers see either the old file or the complete new one.
pub fn write_atomic_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        DescriptorError::io(path, std::io::Error::other("atomic write target has no parent"))
    })?;
    ensure_dir(parent)?;
    let tmp = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("file"),
        std::process::id()
    ));
    let written = write_and_sync(&tmp, bytes)
        .map_err(|e| DescriptorError::io(&tmp, e))
        .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| DescriptorError::io(path, e)));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = std::fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

/// Read and decode a bincode entry. A missing file is `Ok(None)`.
pub fn read_entry<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(DescriptorError::io(path, e)),
    };
    Ok(Some(bincode::deserialize(&bytes)?))
}

pub fn write_entry<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    write_atomic_file(path, &bytes)
}
