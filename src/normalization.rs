//! Dataset-wide feature centering and scaling.
//!
//! Statistics live next to the combined cache as
//! `normalization_factors_<filter_tag>.dat`: two space-separated text rows,
//! `mu` then `width`, one column per retained dimension. `filter_tag` is
//! `no_filter`, or `filter_<digest>` for a filtered dataset.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::cache::digest::filter_digest;
use crate::cache::io::write_atomic_file;
use crate::data::filter::FeatureFilter;
use crate::error::{DescriptorError, Result};

/// Standard deviations below this are treated as constant dimensions.
pub const WIDTH_FLOOR: f64 = 1e-7;

const NO_FILTER_TAG: &str = "no_filter";

/// Per-dimension `mu` and `width`; `apply` maps `x` to `(x - mu) / width`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationStats {
    pub mu: Vec<f32>,
    pub width: Vec<f32>,
}

/// How [`NormalizationManager`] obtained its statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsSource {
    /// Read from the file matching the current filter.
    Loaded,
    /// Read from the unfiltered file and restricted to the filter's indices.
    ReusedSuperset,
    /// Computed by a full pass over the dataset.
    Computed,
    /// Copied from another dataset instance.
    Copied,
}

impl fmt::Display for StatsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatsSource::Loaded => "loaded",
            StatsSource::ReusedSuperset => "reused from unfiltered statistics",
            StatsSource::Computed => "computed",
            StatsSource::Copied => "copied",
        };
        f.write_str(s)
    }
}

impl NormalizationStats {
    pub fn len(&self) -> usize {
        self.mu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mu.is_empty()
    }

    /// Mean and population standard deviation per dimension over `rows`.
    /// Widths below [`WIDTH_FLOOR`] become exactly `1.0`.
    pub fn compute<I>(rows: I, dims: usize) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Vec<f32>>>,
    {
        // Welford, in f64.
        let mut count = 0u64;
        let mut mean = vec![0f64; dims];
        let mut m2 = vec![0f64; dims];
        for row in rows {
            let row = row?;
            if row.len() != dims {
                return Err(DescriptorError::DataInconsistency(format!(
                    "sample has {} features, expected {dims}",
                    row.len()
                )));
            }
            count += 1;
            let n = count as f64;
            for ((x, mean), m2) in row.iter().zip(mean.iter_mut()).zip(m2.iter_mut()) {
                let x = f64::from(*x);
                let delta = x - *mean;
                *mean += delta / n;
                *m2 += delta * (x - *mean);
            }
        }
        if count == 0 {
            return Err(DescriptorError::DataInconsistency(
                "cannot compute normalization factors over an empty dataset".to_string(),
            ));
        }

        let n = count as f64;
        let width = m2
            .iter()
            .map(|m2| {
                let std = (m2 / n).sqrt();
                if std < WIDTH_FLOOR {
                    1.0
                } else {
                    std as f32
                }
            })
            .collect();
        Ok(NormalizationStats {
            mu: mean.into_iter().map(|m| m as f32).collect(),
            width,
        })
    }

    /// Restrict unfiltered statistics to a filter's dimensions.
    pub fn select(&self, filter: &FeatureFilter) -> Result<Self> {
        filter.check_width(self.len())?;
        Ok(NormalizationStats {
            mu: filter.indices().iter().map(|&i| self.mu[i]).collect(),
            width: filter.indices().iter().map(|&i| self.width[i]).collect(),
        })
    }

    pub fn apply(&self, x: &[f32]) -> Result<Vec<f32>> {
        if x.len() != self.len() {
            return Err(DescriptorError::DataInconsistency(format!(
                "normalization factors cover {} dimensions, sample has {}",
                self.len(),
                x.len()
            )));
        }
        Ok(x
            .iter()
            .zip(self.mu.iter().zip(&self.width))
            .map(|(x, (mu, width))| (x - mu) / width)
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_writer(Vec::new());
        for row in [&self.mu, &self.width] {
            writer.write_record(row.iter().map(|v| format!("{v:e}")))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| DescriptorError::io(path, e.into_error()))?;
        write_atomic_file(path, &bytes)
    }

    /// Read a stats file. Values are parsed straight to `f32`, so files
    /// written with more decimal digits than needed still load exactly.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut rows = Vec::with_capacity(2);
        for record in reader.records() {
            let record = record?;
            let row = record
                .iter()
                .filter(|tok| !tok.is_empty())
                .map(|tok| {
                    tok.parse::<f32>().map_err(|_| {
                        DescriptorError::DataInconsistency(format!(
                            "{}: '{tok}' is not a number",
                            path.display()
                        ))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;
            rows.push(row);
        }

        let [mu, width]: [Vec<f32>; 2] = rows.try_into().map_err(|rows: Vec<Vec<f32>>| {
            DescriptorError::DataInconsistency(format!(
                "{}: expected 2 rows (mu, width), found {}",
                path.display(),
                rows.len()
            ))
        })?;
        if mu.len() != width.len() {
            return Err(DescriptorError::DataInconsistency(format!(
                "{}: mu has {} columns but width has {}",
                path.display(),
                mu.len(),
                width.len()
            )));
        }
        Ok(NormalizationStats { mu, width })
    }
}

/// `normalization_factors_<filter_tag>.dat`
pub fn stats_file_name(filter: Option<&FeatureFilter>) -> String {
    let tag = match filter {
        Some(filter) => format!("filter_{}", filter_digest(filter)),
        None => NO_FILTER_TAG.to_string(),
    };
    format!("normalization_factors_{tag}.dat")
}

// ---------------------------------------------------------------------------
// NormalizationManager
// ---------------------------------------------------------------------------

/// Owns the statistics of one dataset instance and the on-disk resolution
/// order. The full-pass computation is driven by the dataset, which feeds the
/// filtered, unnormalized samples to [`NormalizationManager::compute_and_persist`].
#[derive(Debug, Clone)]
pub struct NormalizationManager {
    folder: PathBuf,
    filter: Option<FeatureFilter>,
    raw_width: usize,
    stats: Option<NormalizationStats>,
    source: Option<StatsSource>,
}

impl NormalizationManager {
    /// `raw_width` is the unfiltered feature width of the dataset.
    pub fn new(folder: impl Into<PathBuf>, filter: Option<FeatureFilter>, raw_width: usize) -> Self {
        NormalizationManager {
            folder: folder.into(),
            filter,
            raw_width,
            stats: None,
            source: None,
        }
    }

    pub fn filter(&self) -> Option<&FeatureFilter> {
        self.filter.as_ref()
    }

    /// Number of dimensions the statistics must cover.
    pub fn dims(&self) -> usize {
        match &self.filter {
            Some(filter) => filter.len(),
            None => self.raw_width,
        }
    }

    pub fn stats(&self) -> Option<&NormalizationStats> {
        self.stats.as_ref()
    }

    pub fn source(&self) -> Option<StatsSource> {
        self.source
    }

    /// Statistics are resolved, so outputs are normalized on read.
    pub fn is_active(&self) -> bool {
        self.stats.is_some()
    }

    pub fn stats_path(&self) -> PathBuf {
        self.folder.join(stats_file_name(self.filter.as_ref()))
    }

    pub fn unfiltered_stats_path(&self) -> PathBuf {
        self.folder.join(stats_file_name(None))
    }

    /// Resolution steps that need no dataset pass: the file for the current
    /// filter, then (with a filter) the unfiltered file restricted to it.
    /// Returns `None` when the stats still have to be computed.
    pub fn load_persisted(&mut self) -> Result<Option<StatsSource>> {
        let own = self.stats_path();
        if own.is_file() {
            let stats = NormalizationStats::load(&own)?;
            self.install(stats, StatsSource::Loaded)?;
            return Ok(Some(StatsSource::Loaded));
        }

        if let Some(filter) = &self.filter {
            let superset = self.unfiltered_stats_path();
            if superset.is_file() {
                let full = NormalizationStats::load(&superset)?;
                check_dims(&full, self.raw_width, &superset.display().to_string())?;
                let stats = full.select(filter)?;
                self.install(stats, StatsSource::ReusedSuperset)?;
                return Ok(Some(StatsSource::ReusedSuperset));
            }
        }
        Ok(None)
    }

    /// Final resolution step: compute over `rows`, persist, activate.
    pub fn compute_and_persist<I>(&mut self, rows: I) -> Result<&NormalizationStats>
    where
        I: IntoIterator<Item = Result<Vec<f32>>>,
    {
        let stats = NormalizationStats::compute(rows, self.dims())?;
        stats.save(&self.stats_path())?;
        self.install(stats, StatsSource::Computed)?;
        self.stats.as_ref().ok_or(DescriptorError::NormalizationPending)
    }

    /// Take another instance's statistics. Both must use the same filter and
    /// serve the same number of dimensions.
    pub fn copy_from(&mut self, other: &NormalizationManager) -> Result<()> {
        if self.filter != other.filter {
            return Err(DescriptorError::FilterMismatch);
        }
        let stats = other.stats.clone().ok_or_else(|| {
            DescriptorError::DataInconsistency(
                "source dataset has no normalization factors to copy".to_string(),
            )
        })?;
        self.install(stats, StatsSource::Copied)
    }

    /// Forget resolved statistics (files on disk are left alone).
    pub fn reset(&mut self) {
        self.stats = None;
        self.source = None;
    }

    pub fn apply(&self, x: &[f32]) -> Result<Vec<f32>> {
        match &self.stats {
            Some(stats) => stats.apply(x),
            None => Err(DescriptorError::NormalizationPending),
        }
    }

    /// Nothing is installed when the widths disagree.
    fn install(&mut self, stats: NormalizationStats, source: StatsSource) -> Result<()> {
        check_dims(&stats, self.dims(), &source.to_string())?;
        self.stats = Some(stats);
        self.source = Some(source);
        Ok(())
    }
}

fn check_dims(stats: &NormalizationStats, expected: usize, origin: &str) -> Result<()> {
    if stats.len() != expected {
        return Err(DescriptorError::DataInconsistency(format!(
            "normalization factors ({origin}) cover {} dimensions, dataset serves {expected}",
            stats.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[f32]]) -> Vec<Result<Vec<f32>>> {
        data.iter().map(|r| Ok(r.to_vec())).collect()
    }

    #[test]
    fn computes_mean_and_population_std() {
        let stats = NormalizationStats::compute(rows(&[&[1.0, 10.0], &[3.0, 30.0]]), 2).unwrap();
        assert_eq!(stats.mu, vec![2.0, 20.0]);
        assert_eq!(stats.width, vec![1.0, 10.0]);
    }

    #[test]
    fn constant_dimension_gets_unit_width() {
        let stats = NormalizationStats::compute(rows(&[&[5.0, 0.0], &[5.0, 2.0], &[5.0, 4.0]]), 2).unwrap();
        assert_eq!(stats.width[0], 1.0);
        assert_eq!(stats.mu[0], 5.0);
        assert_eq!(stats.apply(&[7.5, 2.0]).unwrap()[0], 2.5);
    }

    #[test]
    fn empty_dataset_is_an_error() {
        assert!(NormalizationStats::compute(rows(&[]), 3).is_err());
    }

    #[test]
    fn file_roundtrip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join(stats_file_name(None));
        let stats = NormalizationStats {
            mu: vec![0.1, -3.333_333_3, 1e-20],
            width: vec![1.0, 0.7, 123_456.79],
        };
        stats.save(&p).unwrap();
        assert_eq!(NormalizationStats::load(&p).unwrap(), stats);
    }

    #[test]
    fn loads_numpy_style_text() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("legacy.dat");
        std::fs::write(
            &p,
            "1.000000000000000000e+00 2.500000000000000000e+00\n5.000000000000000000e-01 1.000000000000000000e+00\n",
        )
        .unwrap();
        let stats = NormalizationStats::load(&p).unwrap();
        assert_eq!(stats.mu, vec![1.0, 2.5]);
        assert_eq!(stats.width, vec![0.5, 1.0]);
    }

    #[test]
    fn ragged_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.dat");
        std::fs::write(&p, "1 2 3\n1 2\n").unwrap();
        assert!(NormalizationStats::load(&p).is_err());
        std::fs::write(&p, "1 2 3\n").unwrap();
        assert!(NormalizationStats::load(&p).is_err());
    }

    #[test]
    fn file_names_distinguish_filters() {
        let f = FeatureFilter::from_indices(vec![0, 2]).unwrap();
        assert_eq!(stats_file_name(None), "normalization_factors_no_filter.dat");
        assert_eq!(
            stats_file_name(Some(&f)),
            format!("normalization_factors_filter_{}.dat", filter_digest(&f))
        );
    }

    #[test]
    fn superset_file_is_reused_for_filtered_manager() {
        let dir = tempfile::tempdir().unwrap();
        let full = NormalizationStats {
            mu: vec![1.0, 2.0, 3.0, 4.0],
            width: vec![1.0, 0.5, 0.25, 2.0],
        };
        full.save(&dir.path().join(stats_file_name(None))).unwrap();

        let filter = FeatureFilter::from_indices(vec![1, 3]).unwrap();
        let mut mgr = NormalizationManager::new(dir.path(), Some(filter), 4);
        assert_eq!(mgr.load_persisted().unwrap(), Some(StatsSource::ReusedSuperset));
        assert!(mgr.is_active());
        assert_eq!(mgr.stats().unwrap().mu, vec![2.0, 4.0]);
        assert_eq!(mgr.stats().unwrap().width, vec![0.5, 2.0]);
        // Reuse does not write a filtered file.
        assert!(!mgr.stats_path().exists());
    }

    #[test]
    fn own_file_wins_over_superset() {
        let dir = tempfile::tempdir().unwrap();
        let filter = FeatureFilter::from_indices(vec![0]).unwrap();
        NormalizationStats { mu: vec![9.0, 9.0], width: vec![9.0, 9.0] }
            .save(&dir.path().join(stats_file_name(None)))
            .unwrap();
        NormalizationStats { mu: vec![1.0], width: vec![2.0] }
            .save(&dir.path().join(stats_file_name(Some(&filter))))
            .unwrap();

        let mut mgr = NormalizationManager::new(dir.path(), Some(filter), 2);
        assert_eq!(mgr.load_persisted().unwrap(), Some(StatsSource::Loaded));
        assert_eq!(mgr.stats().unwrap().mu, vec![1.0]);
    }

    #[test]
    fn nothing_on_disk_means_compute() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = NormalizationManager::new(dir.path(), None, 1);
        assert_eq!(mgr.load_persisted().unwrap(), None);
        assert!(matches!(mgr.apply(&[1.0]), Err(DescriptorError::NormalizationPending)));

        mgr.compute_and_persist(rows(&[&[0.0], &[2.0]])).unwrap();
        assert_eq!(mgr.source(), Some(StatsSource::Computed));
        assert!(mgr.stats_path().is_file());
        assert_eq!(mgr.apply(&[3.0]).unwrap(), vec![2.0]);
    }

    #[test]
    fn copy_requires_identical_filters() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = NormalizationManager::new(dir.path(), None, 2);
        src.compute_and_persist(rows(&[&[0.0, 1.0], &[2.0, 1.0]])).unwrap();

        let mut same = NormalizationManager::new(dir.path(), None, 2);
        same.copy_from(&src).unwrap();
        assert_eq!(same.stats(), src.stats());
        assert_eq!(same.source(), Some(StatsSource::Copied));

        let filter = FeatureFilter::from_indices(vec![0]).unwrap();
        let mut other = NormalizationManager::new(dir.path(), Some(filter), 2);
        let err = other.copy_from(&src).unwrap_err();
        assert!(matches!(err, DescriptorError::FilterMismatch));
        assert!(err.is_configuration());
    }

    #[test]
    fn unfiltered_file_of_another_width_is_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        NormalizationStats { mu: vec![0.0; 6], width: vec![1.0; 6] }
            .save(&dir.path().join(stats_file_name(None)))
            .unwrap();

        let mut mgr = NormalizationManager::new(dir.path(), None, 4);
        let err = mgr.load_persisted().unwrap_err();
        assert!(matches!(err, DescriptorError::DataInconsistency(_)));
        assert!(!mgr.is_active());
        assert_eq!(mgr.source(), None);

        // A filter that fits inside the file does not hide the mismatch.
        let filter = FeatureFilter::from_indices(vec![0, 1]).unwrap();
        let mut filtered = NormalizationManager::new(dir.path(), Some(filter), 4);
        assert!(filtered.load_persisted().is_err());
        assert!(filtered.stats().is_none());
    }

    #[test]
    fn copy_between_different_widths_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut wide = NormalizationManager::new(dir.path().join("wide"), None, 3);
        wide.compute_and_persist(rows(&[&[0.0, 1.0, 2.0], &[2.0, 1.0, 0.0]])).unwrap();

        let mut narrow = NormalizationManager::new(dir.path().join("narrow"), None, 2);
        assert!(narrow.copy_from(&wide).is_err());
        assert!(narrow.stats().is_none());
    }
}
