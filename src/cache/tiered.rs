use std::fmt;

use super::block_store::BlockStore;
use super::combined::CombinedCache;
use crate::data::blocks::{BlockRegistry, BlockSelection, DescriptorBlock};
use crate::data::model::{Molecule, Sample};
use crate::error::{DescriptorError, Result};
use crate::materialize::LABEL_WIDTH;

/// Where a sample was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Materialized,
    Combined,
    /// Assembled from block stores and/or fresh block computation.
    Computed,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Materialized => write!(f, "materialized"),
            Tier::Combined => write!(f, "combined"),
            Tier::Computed => write!(f, "computed"),
        }
    }
}

/// Per-tier hit counts since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounters {
    pub materialized: u64,
    pub combined: u64,
    /// Blocks served by a block store.
    pub block_hits: u64,
    /// Blocks handed to their `DescriptorBlock::compute`.
    pub block_computations: u64,
}

impl TierCounters {
    pub(crate) fn record(&mut self, tier: Tier) {
        match tier {
            Tier::Materialized => self.materialized += 1,
            Tier::Combined => self.combined += 1,
            Tier::Computed => {}
        }
    }
}

/// Disk tiers plus computation for raw (unfiltered, unnormalized) samples.
///
/// Resolution per molecule:
/// 1. the combined per-sample entry, if that tier is enabled; an entry of the
///    wrong shape is treated as stale, recomputed and overwritten;
/// 2. per active block, each block store in order, then the block itself;
///    a hit backfills the stores ahead of it, a computed block is written to
///    all of them;
/// 3. the concatenation is written back to the combined tier.
pub struct TieredCache {
    registry: BlockRegistry,
    selection: BlockSelection,
    combined: Option<CombinedCache>,
    block_stores: Vec<Box<dyn BlockStore>>,
    label_property: String,
    counters: TierCounters,
}

impl TieredCache {
    pub fn new(
        registry: BlockRegistry,
        selection: BlockSelection,
        combined: Option<CombinedCache>,
        block_stores: Vec<Box<dyn BlockStore>>,
        label_property: impl Into<String>,
    ) -> Result<Self> {
        selection.validate(&registry)?;
        Ok(TieredCache {
            registry,
            selection,
            combined,
            block_stores,
            label_property: label_property.into(),
            counters: TierCounters::default(),
        })
    }

    pub fn selection(&self) -> &BlockSelection {
        &self.selection
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn combined(&self) -> Option<&CombinedCache> {
        self.combined.as_ref()
    }

    /// Width of every raw vector this cache produces.
    pub fn raw_width(&self) -> usize {
        self.selection.feature_width(&self.registry)
    }

    pub fn counters(&self) -> TierCounters {
        self.counters
    }

    pub(crate) fn counters_mut(&mut self) -> &mut TierCounters {
        &mut self.counters
    }

    pub fn resolve(&mut self, molecule: &Molecule) -> Result<(Sample, Tier)> {
        if let Some(sample) = self.load_combined(molecule)? {
            let width = self.raw_width();
            if sample.features.len() == width && sample.label.len() == LABEL_WIDTH {
                log::debug!("{}: combined cache hit", molecule.id);
                self.counters.record(Tier::Combined);
                return Ok((sample, Tier::Combined));
            }
            log::warn!(
                "{}: combined cache entry has {} features and {} labels, expected {width} and {LABEL_WIDTH}; recomputing",
                molecule.id,
                sample.features.len(),
                sample.label.len()
            );
        }

        let sample = Sample::new(self.assemble(molecule)?, molecule.label(&self.label_property));
        if let Some(combined) = &self.combined {
            combined.store(&molecule.id, &sample)?;
        }
        Ok((sample, Tier::Computed))
    }

    /// Combined tier alone.
    pub fn load_combined(&self, molecule: &Molecule) -> Result<Option<Sample>> {
        match &self.combined {
            Some(combined) => combined.load(&molecule.id),
            None => Ok(None),
        }
    }

    /// Concatenate all active blocks in selection order, via the block tiers.
    pub fn assemble(&mut self, molecule: &Molecule) -> Result<Vec<f32>> {
        let mut features = Vec::with_capacity(self.raw_width());
        let active: Vec<usize> = self.selection.active().collect();
        for slot in active {
            let block = match self.registry.get(slot) {
                Some(block) => block.clone(),
                None => {
                    return Err(DescriptorError::SelectionLength {
                        expected: self.registry.len(),
                        got: self.selection.flags().len(),
                    })
                }
            };
            let values = self.resolve_block(block.as_ref(), molecule)?;
            features.extend_from_slice(&values);
        }
        Ok(features)
    }

    fn resolve_block(&mut self, block: &dyn DescriptorBlock, molecule: &Molecule) -> Result<Vec<f32>> {
        let name = block.name();
        for i in 0..self.block_stores.len() {
            if let Some(values) = self.block_stores[i].load(name, &molecule.id)? {
                check_width(block, molecule, &values)?;
                log::debug!("{}: {name} served by {} store", molecule.id, self.block_stores[i].tier());
                for earlier in &mut self.block_stores[..i] {
                    earlier.store(name, &molecule.id, &values)?;
                }
                self.counters.block_hits += 1;
                return Ok(values);
            }
        }

        let values = block
            .compute(molecule)
            .map_err(|cause| DescriptorError::Compute {
                block: name.to_string(),
                molecule: molecule.id.clone(),
                cause,
            })?;
        check_width(block, molecule, &values)?;
        self.counters.block_computations += 1;
        for store in &mut self.block_stores {
            store.store(name, &molecule.id, &values)?;
        }
        Ok(values)
    }

    pub fn flush(&mut self) -> Result<()> {
        for store in &mut self.block_stores {
            store.flush()?;
        }
        Ok(())
    }
}

fn check_width(block: &dyn DescriptorBlock, molecule: &Molecule, values: &[f32]) -> Result<()> {
    if values.len() != block.width() {
        return Err(DescriptorError::BlockWidth {
            block: block.name().to_string(),
            molecule: molecule.id.clone(),
            expected: block.width(),
            got: values.len(),
        });
    }
    Ok(())
}

impl fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredCache")
            .field("registry", &self.registry)
            .field("selection", &self.selection)
            .field("combined", &self.combined)
            .field(
                "block_stores",
                &self.block_stores.iter().map(|s| s.tier()).collect::<Vec<_>>(),
            )
            .field("counters", &self.counters)
            .finish()
    }
}
