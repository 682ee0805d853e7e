use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::Level;

use crate::cache::digest::selection_digest;
use crate::cache::io::check_entry_id;
use crate::cache::{BlockFileCache, BlockStore, ColumnarCache, CombinedCache, Tier, TierCounters, TieredCache};
use crate::config::DatasetConfig;
use crate::data::blocks::BlockRegistry;
use crate::data::filter::FeatureFilter;
use crate::data::model::{Molecule, Sample};
use crate::error::{DescriptorError, Result};
use crate::materialize::{estimate_bytes, MaterializedCache, LABEL_WIDTH};
use crate::normalization::{NormalizationManager, NormalizationStats, StatsSource};

// ---------------------------------------------------------------------------
// DescriptorDataset
// ---------------------------------------------------------------------------

/// Indexed access to the feature vectors of a fixed molecule list.
///
/// Sample `i` is served from the materialized cache when it has been built,
/// otherwise from the disk tiers or fresh block computation; the feature
/// filter and normalization are applied after retrieval either way, so every
/// route yields the same values.
pub struct DescriptorDataset {
    molecules: Arc<[Molecule]>,
    config: DatasetConfig,
    selection_digest: String,
    cache_folder: PathBuf,
    tiers: TieredCache,
    normalization: NormalizationManager,
    materialized: Option<MaterializedCache>,
}

impl DescriptorDataset {
    pub fn new(
        molecules: impl Into<Arc<[Molecule]>>,
        registry: BlockRegistry,
        config: DatasetConfig,
    ) -> Result<Self> {
        let molecules = molecules.into();
        config.selection.validate(&registry)?;
        let raw_width = config.selection.feature_width(&registry);

        let filter = config
            .feature_filter
            .as_ref()
            .map(|source| source.resolve())
            .transpose()?;
        if let Some(filter) = &filter {
            filter.check_width(raw_width)?;
        }

        let any_disk_tier = config.use_combined_cache || config.use_block_cache || config.use_columnar_cache;
        if any_disk_tier {
            for molecule in molecules.iter() {
                check_entry_id(&molecule.id)?;
            }
        }

        let selection_digest = selection_digest(&config.selection);
        let cache_folder = config.resolved_cache_folder(&selection_digest);

        let combined = if config.use_combined_cache {
            Some(CombinedCache::open(&cache_folder)?)
        } else {
            None
        };

        let mut block_stores: Vec<Box<dyn BlockStore>> = Vec::new();
        if config.use_columnar_cache {
            let names: Vec<&str> = config
                .selection
                .active()
                .filter_map(|slot| registry.get(slot))
                .map(|b| b.name())
                .collect();
            block_stores.push(Box::new(ColumnarCache::open(&config.data_root, names)?));
        }
        if config.use_block_cache {
            block_stores.push(Box::new(BlockFileCache::new(&config.data_root)));
        }

        let tiers = TieredCache::new(
            registry,
            config.selection.clone(),
            combined,
            block_stores,
            config.label_property.clone(),
        )?;
        let normalization = NormalizationManager::new(&cache_folder, filter, raw_width);

        log::debug!(
            "dataset of {} molecules, selection {selection_digest}, {raw_width} raw features, cache {}",
            molecules.len(),
            cache_folder.display()
        );

        Ok(DescriptorDataset {
            molecules,
            config,
            selection_digest,
            cache_folder,
            tiers,
            normalization,
            materialized: None,
        })
    }

    /// Number of samples; fixed at construction.
    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn selection_digest(&self) -> &str {
        &self.selection_digest
    }

    /// Folder of the combined cache and the normalization files.
    pub fn cache_folder(&self) -> &Path {
        &self.cache_folder
    }

    /// Width of the concatenated blocks before filtering.
    pub fn raw_width(&self) -> usize {
        self.tiers.raw_width()
    }

    /// Width of the served feature vectors.
    pub fn feature_width(&self) -> usize {
        self.normalization.dims()
    }

    pub fn feature_filter(&self) -> Option<&FeatureFilter> {
        self.normalization.filter()
    }

    pub fn normalization_stats(&self) -> Option<&NormalizationStats> {
        self.normalization.stats()
    }

    pub fn stats_source(&self) -> Option<StatsSource> {
        self.normalization.source()
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized.is_some()
    }

    pub fn tier_counters(&self) -> TierCounters {
        self.tiers.counters()
    }

    /// Whether served vectors are normalized.
    pub fn normalizes(&self) -> bool {
        self.config.normalize || self.normalization.is_active()
    }

    pub fn get_item(&mut self, index: usize) -> Result<Sample> {
        self.get_item_traced(index).map(|(sample, _)| sample)
    }

    /// [`get_item`](Self::get_item), also reporting the tier that served it.
    pub fn get_item_traced(&mut self, index: usize) -> Result<(Sample, Tier)> {
        if index >= self.len() {
            return Err(DescriptorError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        if let Some(sample) = self.materialized.as_ref().and_then(|m| m.get(index)) {
            self.tiers.counters_mut().record(Tier::Materialized);
            return Ok((sample, Tier::Materialized));
        }

        let (mut sample, tier) = resolve_filtered(
            &mut self.tiers,
            &self.molecules[index],
            self.normalization.filter(),
        )?;
        if self.normalizes() {
            sample.features = self.normalize(&sample.features)?;
        }
        Ok((sample, tier))
    }

    /// Every sample in index order.
    pub fn iter(&mut self) -> impl Iterator<Item = Result<Sample>> + '_ {
        let n = self.len();
        (0..n).map(move |i| self.get_item(i))
    }

    /// Normalize one filtered vector, resolving statistics first if needed.
    pub fn normalize(&mut self, features: &[f32]) -> Result<Vec<f32>> {
        if self.normalization.stats().is_none() {
            self.find_normalization_factors()?;
        }
        self.normalization.apply(features)
    }

    /// Resolve normalization statistics: the file for the current filter, the
    /// unfiltered file restricted to the filter, or a full pass that computes
    /// and persists them. Normalization is active afterwards and the
    /// materialized cache is (re)built if it fits the budget.
    pub fn find_normalization_factors(&mut self) -> Result<&NormalizationStats> {
        self.materialized = None;
        self.normalization.reset();
        let level = self.pass_level();

        match self.normalization.load_persisted()? {
            Some(source) => {
                log::log!(
                    level,
                    "normalization factors for {} features {source} from {}",
                    self.feature_width(),
                    self.cache_folder.display()
                );
            }
            None => {
                let dims = self.feature_width();
                let n = self.len();
                log::log!(level, "generating normalization factors for a ({n}, {dims}) dataset");
                let filter = self.normalization.filter().cloned();
                let tiers = &mut self.tiers;
                let molecules = &self.molecules;
                self.normalization.compute_and_persist(
                    (0..n).map(|i| {
                        resolve_filtered(tiers, &molecules[i], filter.as_ref()).map(|(s, _)| s.features)
                    }),
                )?;
                self.tiers.flush()?;
            }
        }

        self.try_materialize()?;
        self.normalization
            .stats()
            .ok_or(DescriptorError::NormalizationPending)
    }

    /// Adopt another instance's statistics; both must use the same filter.
    pub fn copy_normalization_factors(&mut self, other: &DescriptorDataset) -> Result<()> {
        self.normalization.copy_from(&other.normalization)?;
        self.materialized = None;
        Ok(())
    }

    /// Hold the processed dataset in memory if it fits the byte budget.
    /// Returns `false` (and keeps nothing) when it does not.
    pub fn try_materialize(&mut self) -> Result<bool> {
        if self.config.normalize && !self.normalization.is_active() {
            return Err(DescriptorError::NormalizationPending);
        }
        self.materialized = None;

        let n = self.len();
        let width = self.feature_width();
        let needed = estimate_bytes(n, width, LABEL_WIDTH);
        let budget = self.config.materialize_budget_bytes;
        if needed > budget {
            log::warn!(
                "materializing needs {:.1} MiB, more than the {:.1} MiB limit; samples will be read from disk instead",
                needed as f64 / (1024.0 * 1024.0),
                budget as f64 / (1024.0 * 1024.0)
            );
            return Ok(false);
        }

        let filter = self.normalization.filter().cloned();
        let tiers = &mut self.tiers;
        let molecules = &self.molecules;
        let normalization = &self.normalization;
        let cache = MaterializedCache::collect(
            (0..n).map(|i| -> Result<Sample> {
                let (mut sample, _) = resolve_filtered(tiers, &molecules[i], filter.as_ref())?;
                if normalization.is_active() {
                    sample.features = normalization.apply(&sample.features)?;
                }
                Ok(sample)
            }),
            width,
            n,
        )?;
        self.tiers.flush()?;

        log::log!(
            self.pass_level(),
            "materialized a ({n}, {width}) feature matrix and ({n}, {LABEL_WIDTH}) label matrix"
        );
        self.materialized = Some(cache);
        Ok(true)
    }

    /// Per-dimension `(min, max)` of the served vectors. NaN values are skipped.
    pub fn find_ranges(&mut self) -> Result<Vec<(f32, f32)>> {
        let width = self.feature_width();
        let mut ranges = vec![(f32::INFINITY, f32::NEG_INFINITY); width];
        let n = self.len();
        for i in 0..n {
            let sample = self.get_item(i)?;
            for ((lo, hi), x) in ranges.iter_mut().zip(&sample.features) {
                *lo = lo.min(*x);
                *hi = hi.max(*x);
            }
        }
        Ok(ranges)
    }

    /// Persist buffered block-store writes.
    pub fn flush(&mut self) -> Result<()> {
        self.tiers.flush()
    }

    /// Flush and release the block stores, reporting any failure.
    pub fn close(mut self) -> Result<()> {
        self.tiers.flush()
    }

    fn pass_level(&self) -> Level {
        if self.config.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }
}

/// Raw sample from the tiers with the feature filter applied.
fn resolve_filtered(
    tiers: &mut TieredCache,
    molecule: &Molecule,
    filter: Option<&FeatureFilter>,
) -> Result<(Sample, Tier)> {
    let (mut sample, tier) = tiers.resolve(molecule)?;
    if let Some(filter) = filter {
        sample.features = filter.apply(&sample.features)?;
    }
    Ok((sample, tier))
}

impl std::fmt::Debug for DescriptorDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorDataset")
            .field("len", &self.len())
            .field("selection_digest", &self.selection_digest)
            .field("cache_folder", &self.cache_folder)
            .field("tiers", &self.tiers)
            .field("stats_source", &self.normalization.source())
            .field("materialized", &self.materialized.as_ref().map(|m| m.size_bytes()))
            .finish()
    }
}
