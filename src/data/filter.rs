use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DescriptorError, Result};

// ---------------------------------------------------------------------------
// FilterSource – how a filter is supplied in configuration
// ---------------------------------------------------------------------------

/// A feature filter as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSource {
    /// Explicit raw-vector indices.
    Indices(Vec<usize>),
    /// Boolean membership mask over the raw vector.
    Mask(Vec<bool>),
    /// A persisted array; see [`crate::data::loader::load_filter_file`].
    Path(PathBuf),
}

impl FilterSource {
    pub fn resolve(&self) -> Result<FeatureFilter> {
        match self {
            FilterSource::Indices(idx) => FeatureFilter::from_indices(idx.clone()),
            FilterSource::Mask(mask) => FeatureFilter::from_mask(mask),
            FilterSource::Path(path) => super::loader::load_filter_file(path),
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureFilter – retained raw dimensions
// ---------------------------------------------------------------------------

/// Strictly increasing indices into the raw concatenated feature vector.
///
/// Ordering is fixed so that the membership mask (and therefore the filter
/// digest) identifies a filter completely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureFilter {
    indices: Vec<usize>,
}

impl FeatureFilter {
    pub fn from_indices(indices: Vec<usize>) -> Result<Self> {
        if indices.is_empty() {
            return Err(DescriptorError::InvalidFilter(
                "filter selects no features".to_string(),
            ));
        }
        if let Some(w) = indices.windows(2).find(|w| w[0] >= w[1]) {
            return Err(DescriptorError::InvalidFilter(format!(
                "indices must be strictly increasing, found {} followed by {}",
                w[0], w[1]
            )));
        }
        Ok(FeatureFilter { indices })
    }

    pub fn from_mask(mask: &[bool]) -> Result<Self> {
        let indices = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| i)
            .collect();
        Self::from_indices(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of retained dimensions.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// `mask[i]` is true when raw dimension `i` is retained. The mask ends at
    /// the last retained dimension.
    pub fn membership_mask(&self) -> Vec<bool> {
        let len = self.indices.last().map_or(0, |last| last + 1);
        let mut mask = vec![false; len];
        for &i in &self.indices {
            mask[i] = true;
        }
        mask
    }

    /// Error unless every index addresses a dimension of a `width`-wide vector.
    pub fn check_width(&self, width: usize) -> Result<()> {
        match self.indices.last() {
            Some(&last) if last >= width => Err(DescriptorError::FilterOutOfRange { index: last, width }),
            _ => Ok(()),
        }
    }

    /// Gather the retained dimensions of `raw`.
    pub fn apply(&self, raw: &[f32]) -> Result<Vec<f32>> {
        self.check_width(raw.len())?;
        Ok(self.indices.iter().map(|&i| raw[i]).collect())
    }
}
