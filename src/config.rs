use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::blocks::BlockSelection;
use crate::data::filter::FilterSource;
use crate::data::model::DEFAULT_LABEL_PROPERTY;
use crate::error::{DescriptorError, Result};

/// Folder under the data root that holds one combined cache per selection.
pub const COMBINED_CACHE_DIR: &str = "combined_modular_repr_cache";

const DEFAULT_BUDGET_BYTES: u64 = 512 * 1024 * 1024;

/// Construction-time options of a [`crate::DescriptorDataset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Active blocks, one flag per registered block kind.
    pub selection: BlockSelection,
    /// Root of the per-block caches and of the default combined cache.
    pub data_root: PathBuf,
    /// Replaces `<data_root>/combined_modular_repr_cache/<selectionDigest>`.
    pub cache_folder: Option<PathBuf>,
    /// Normalize features on read, resolving statistics on first use.
    pub normalize: bool,
    pub feature_filter: Option<FilterSource>,
    /// Log dataset-wide passes at `info` instead of `debug`.
    pub verbose: bool,
    pub use_combined_cache: bool,
    pub use_block_cache: bool,
    pub use_columnar_cache: bool,
    /// In-memory materialization budget in bytes.
    pub materialize_budget_bytes: u64,
    pub label_property: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            selection: BlockSelection::default(),
            data_root: PathBuf::from("."),
            cache_folder: None,
            normalize: false,
            feature_filter: None,
            verbose: false,
            use_combined_cache: true,
            use_block_cache: false,
            use_columnar_cache: false,
            materialize_budget_bytes: DEFAULT_BUDGET_BYTES,
            label_property: DEFAULT_LABEL_PROPERTY.to_string(),
        }
    }
}

impl DatasetConfig {
    pub fn new(selection: impl Into<BlockSelection>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            selection: selection.into(),
            data_root: data_root.into(),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DescriptorError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Budget expressed in MiB, the unit most callers think in.
    pub fn with_budget_mb(mut self, mb: u64) -> Self {
        self.materialize_budget_bytes = mb * 1024 * 1024;
        self
    }

    /// Folder of the combined cache and the normalization files.
    pub fn resolved_cache_folder(&self, selection_digest: &str) -> PathBuf {
        match &self.cache_folder {
            Some(folder) => folder.clone(),
            None => self.data_root.join(COMBINED_CACHE_DIR).join(selection_digest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_behaviour() {
        let cfg = DatasetConfig::default();
        assert!(cfg.use_combined_cache);
        assert!(!cfg.use_block_cache && !cfg.use_columnar_cache);
        assert_eq!(cfg.materialize_budget_bytes, 512 * 1024 * 1024);
        assert_eq!(cfg.label_property, "dG");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: DatasetConfig = serde_json::from_str(
            r#"{"selection": [true, false], "data_root": "/data", "feature_filter": {"indices": [0, 3]}}"#,
        )
        .unwrap();
        assert_eq!(cfg.selection.flags(), &[true, false]);
        assert_eq!(cfg.feature_filter, Some(FilterSource::Indices(vec![0, 3])));
        assert!(cfg.use_combined_cache);
    }

    #[test]
    fn cache_folder_default_and_override() {
        let cfg = DatasetConfig::new(vec![true], "/data");
        assert_eq!(
            cfg.resolved_cache_folder("abc"),
            PathBuf::from("/data/combined_modular_repr_cache/abc")
        );
        let cfg = DatasetConfig {
            cache_folder: Some("/tmp/c".into()),
            ..cfg
        };
        assert_eq!(cfg.resolved_cache_folder("abc"), PathBuf::from("/tmp/c"));
    }

    #[test]
    fn loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("dataset.json");
        std::fs::write(&p, r#"{"normalize": true, "materialize_budget_bytes": 1024}"#).unwrap();
        let cfg = DatasetConfig::from_json_file(&p).unwrap();
        assert!(cfg.normalize);
        assert_eq!(cfg.materialize_budget_bytes, 1024);
    }
}
