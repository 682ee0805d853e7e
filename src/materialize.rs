use std::mem::size_of;

use crate::data::model::Sample;
use crate::error::{DescriptorError, Result};

/// Label columns per sample.
pub const LABEL_WIDTH: usize = 1;

/// Bytes needed to hold `samples` rows of `feature_width + label_width` `f32`s.
pub fn estimate_bytes(samples: usize, feature_width: usize, label_width: usize) -> u64 {
    samples as u64 * (feature_width + label_width) as u64 * size_of::<f32>() as u64
}

/// The fully processed dataset as two dense row-major matrices.
#[derive(Debug, Clone)]
pub struct MaterializedCache {
    features: Vec<f32>,
    labels: Vec<f32>,
    feature_width: usize,
    len: usize,
}

impl MaterializedCache {
    /// Collect every sample; all rows must share `feature_width`.
    pub fn collect<I>(samples: I, feature_width: usize, len_hint: usize) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Sample>>,
    {
        let mut features = Vec::with_capacity(len_hint * feature_width);
        let mut labels = Vec::with_capacity(len_hint * LABEL_WIDTH);
        let mut len = 0;
        for sample in samples {
            let sample = sample?;
            if sample.features.len() != feature_width || sample.label.len() != LABEL_WIDTH {
                return Err(DescriptorError::DataInconsistency(format!(
                    "sample {len} has shape ({}, {}), expected ({feature_width}, {LABEL_WIDTH})",
                    sample.features.len(),
                    sample.label.len()
                )));
            }
            features.extend_from_slice(&sample.features);
            labels.extend_from_slice(&sample.label);
            len += 1;
        }
        Ok(MaterializedCache {
            features,
            labels,
            feature_width,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn feature_width(&self) -> usize {
        self.feature_width
    }

    pub fn features(&self, index: usize) -> Option<&[f32]> {
        (index < self.len)
            .then(|| &self.features[index * self.feature_width..(index + 1) * self.feature_width])
    }

    pub fn get(&self, index: usize) -> Option<Sample> {
        let features = self.features(index)?.to_vec();
        let label = self.labels[index * LABEL_WIDTH..(index + 1) * LABEL_WIDTH].to_vec();
        Some(Sample { features, label })
    }

    /// Actual bytes held by the two matrices.
    pub fn size_bytes(&self) -> u64 {
        estimate_bytes(self.len, self.feature_width, LABEL_WIDTH)
    }
}
