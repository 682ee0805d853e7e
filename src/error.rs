use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("block selection has {got} entries but {expected} block kinds are registered")]
    SelectionLength { expected: usize, got: usize },

    #[error("invalid feature filter: {0}")]
    InvalidFilter(String),

    #[error("feature filter index {index} is out of range for a {width}-wide feature vector")]
    FilterOutOfRange { index: usize, width: usize },

    #[error("failed to load feature filter from {}: {cause:#}", path.display())]
    FilterLoad { path: PathBuf, cause: anyhow::Error },

    #[error("block name {name:?} {reason}")]
    InvalidBlockName { name: String, reason: &'static str },

    #[error("mismatching feature filters")]
    FilterMismatch,

    #[error("molecule id {0:?} cannot be used as a cache file name")]
    InvalidMoleculeId(String),

    #[error("index {index} out of range for dataset of {len} samples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("block {block} returned {got} values for molecule {molecule}, expected {expected}")]
    BlockWidth { block: String, molecule: String, expected: usize, got: usize },

    #[error("computing block {block} for molecule {molecule} failed: {cause:#}")]
    Compute { block: String, molecule: String, cause: anyhow::Error },

    #[error("materialization requested before normalization factors were resolved")]
    NormalizationPending,

    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("io error on {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("bincode error {0}")]
    Deserialization(#[from] Box<bincode::ErrorKind>),

    #[error("csv error {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet error {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("config error {0}")]
    Config(#[from] serde_json::Error),
}

impl DescriptorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DescriptorError::Io { path: path.into(), source }
    }

    /// Whether this error is one of the fatal configuration problems that are
    /// surfaced immediately instead of being encoded in the data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DescriptorError::SelectionLength { .. }
                | DescriptorError::InvalidFilter(_)
                | DescriptorError::FilterOutOfRange { .. }
                | DescriptorError::FilterLoad { .. }
                | DescriptorError::FilterMismatch
                | DescriptorError::InvalidBlockName { .. }
                | DescriptorError::InvalidMoleculeId(_)
                | DescriptorError::CreateDir { .. }
                | DescriptorError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DescriptorError>;
