use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::model::Molecule;
use crate::error::{DescriptorError, Result};

/// Standard descriptor block names, in their canonical declaration order.
/// Registries that keep this order stay compatible with selection masks (and
/// therefore cache folders) produced by the Python descriptor pipeline.
pub const STANDARD_BLOCK_NAMES: [&str; 21] = [
    "MACCS",
    "rdkitFP",
    "minFeatFP",
    "MorganFP",
    "Descriptors",
    "EState_FP",
    "Graph_desc",
    "MOE",
    "MQN",
    "GETAWAY",
    "AUTOCORR2D",
    "AUTOCORR3D",
    "BCUT2D",
    "WHIM",
    "RDF",
    "USR",
    "USRCUT",
    "PEOE_VSA",
    "SMR_VSA",
    "SlogP_VSA",
    "MORSE",
];

// ---------------------------------------------------------------------------
// DescriptorBlock – one fixed-width feature computation
// ---------------------------------------------------------------------------

/// A named, fixed-width numeric feature computation over a molecule.
///
/// Implementations must be deterministic: the cache layer assumes a value
/// computed today equals the one persisted yesterday.
pub trait DescriptorBlock: Send + Sync {
    /// Human-readable name; also names the per-block cache folder.
    fn name(&self) -> &str;

    /// Number of values `compute` returns for every valid molecule.
    fn width(&self) -> usize;

    fn compute(&self, molecule: &Molecule) -> anyhow::Result<Vec<f32>>;
}

type BlockFn = dyn Fn(&Molecule) -> anyhow::Result<Vec<f32>> + Send + Sync;

/// Adapts a closure into a [`DescriptorBlock`].
pub struct FnBlock {
    name: String,
    width: usize,
    func: Box<BlockFn>,
}

impl FnBlock {
    pub fn new<F>(name: impl Into<String>, width: usize, func: F) -> Self
    where
        F: Fn(&Molecule) -> anyhow::Result<Vec<f32>> + Send + Sync + 'static,
    {
        FnBlock {
            name: name.into(),
            width,
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBlock")
            .field("name", &self.name)
            .field("width", &self.width)
            .finish()
    }
}

impl DescriptorBlock for FnBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> usize {
        self.width
    }

    fn compute(&self, molecule: &Molecule) -> anyhow::Result<Vec<f32>> {
        (self.func)(molecule)
    }
}

// ---------------------------------------------------------------------------
// BlockRegistry – declaration-ordered set of block kinds
// ---------------------------------------------------------------------------

/// All known block kinds, in declaration order. The position of a block in
/// the registry is its position in a [`BlockSelection`].
#[derive(Clone, Default)]
pub struct BlockRegistry {
    blocks: Vec<Arc<dyn DescriptorBlock>>,
    by_name: BTreeMap<String, usize>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block kind. Names must be unique.
    pub fn register(&mut self, block: Arc<dyn DescriptorBlock>) -> Result<usize> {
        let name = block.name().to_string();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(DescriptorError::InvalidBlockName {
                name,
                reason: "cannot be used as a cache folder name",
            });
        }
        if self.by_name.contains_key(&name) {
            return Err(DescriptorError::InvalidBlockName {
                name,
                reason: "is registered twice",
            });
        }
        let slot = self.blocks.len();
        self.by_name.insert(name, slot);
        self.blocks.push(block);
        Ok(slot)
    }

    /// Convenience wrapper around [`FnBlock`].
    pub fn register_fn<F>(&mut self, name: impl Into<String>, width: usize, func: F) -> Result<usize>
    where
        F: Fn(&Molecule) -> anyhow::Result<Vec<f32>> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnBlock::new(name, width, func)))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Arc<dyn DescriptorBlock>> {
        self.blocks.get(slot)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DescriptorBlock>> {
        self.blocks.iter()
    }
}

impl fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.blocks.iter().map(|b| (b.name(), b.width())))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BlockSelection – which blocks are concatenated
// ---------------------------------------------------------------------------

/// One flag per registered block kind, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockSelection(Vec<bool>);

impl BlockSelection {
    pub fn new(flags: Vec<bool>) -> Self {
        BlockSelection(flags)
    }

    /// Every one of `n` blocks active.
    pub fn all(n: usize) -> Self {
        BlockSelection(vec![true; n])
    }

    /// Select blocks by name against a registry's declaration order.
    pub fn from_names(registry: &BlockRegistry, names: &[&str]) -> Result<Self> {
        let mut flags = vec![false; registry.len()];
        for name in names {
            let slot = registry
                .position(name)
                .ok_or_else(|| DescriptorError::InvalidBlockName {
                    name: name.to_string(),
                    reason: "is not registered",
                })?;
            flags[slot] = true;
        }
        Ok(BlockSelection(flags))
    }

    pub fn flags(&self) -> &[bool] {
        &self.0
    }

    /// Indices of the active blocks, in concatenation order.
    pub fn active(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().filter(|(_, on)| **on).map(|(i, _)| i)
    }

    pub fn validate(&self, registry: &BlockRegistry) -> Result<()> {
        if self.0.len() != registry.len() {
            return Err(DescriptorError::SelectionLength {
                expected: registry.len(),
                got: self.0.len(),
            });
        }
        Ok(())
    }

    /// Width of the concatenated raw feature vector.
    pub fn feature_width(&self, registry: &BlockRegistry) -> usize {
        self.active()
            .filter_map(|slot| registry.get(slot))
            .map(|b| b.width())
            .sum()
    }
}

impl From<Vec<bool>> for BlockSelection {
    fn from(flags: Vec<bool>) -> Self {
        BlockSelection(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BlockRegistry {
        let mut r = BlockRegistry::new();
        r.register_fn("A", 2, |_| Ok(vec![1.0, 2.0])).unwrap();
        r.register_fn("B", 3, |_| Ok(vec![0.0; 3])).unwrap();
        r.register_fn("C", 1, |_| Ok(vec![9.0])).unwrap();
        r
    }

    #[test]
    fn selection_width_sums_active_blocks() {
        let r = registry();
        let sel = BlockSelection::new(vec![true, false, true]);
        assert_eq!(sel.feature_width(&r), 3);
        assert_eq!(sel.active().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn from_names_follows_declaration_order() {
        let r = registry();
        let sel = BlockSelection::from_names(&r, &["C", "A"]).unwrap();
        assert_eq!(sel.flags(), &[true, false, true]);
        assert!(BlockSelection::from_names(&r, &["Z"]).is_err());
    }

    #[test]
    fn validate_rejects_wrong_length() {
        let r = registry();
        let err = BlockSelection::all(2).validate(&r).unwrap_err();
        assert!(matches!(err, DescriptorError::SelectionLength { expected: 3, got: 2 }));
    }

    #[test]
    fn duplicate_and_unsafe_names_are_rejected() {
        let mut r = registry();
        let dup = r.register_fn("A", 1, |_| Ok(vec![0.0])).unwrap_err();
        assert!(matches!(dup, DescriptorError::InvalidBlockName { .. }));
        assert!(dup.is_configuration());
        let unsafe_name = r.register_fn("x/y", 1, |_| Ok(vec![0.0])).unwrap_err();
        assert!(unsafe_name.is_configuration());
        assert!(BlockSelection::from_names(&r, &["Z"]).unwrap_err().is_configuration());
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn standard_names_register_in_canonical_order() {
        let mut r = BlockRegistry::new();
        for name in STANDARD_BLOCK_NAMES {
            r.register_fn(name, 1, |_| Ok(vec![0.0])).unwrap();
        }
        assert_eq!(r.len(), STANDARD_BLOCK_NAMES.len());
        assert_eq!(r.position("MACCS"), Some(0));
        assert_eq!(r.position("MORSE"), Some(20));

        let sel = BlockSelection::from_names(&r, &["MQN", "MACCS"]).unwrap();
        sel.validate(&r).unwrap();
        assert_eq!(sel.active().collect::<Vec<_>>(), vec![0, 8]);
        assert_eq!(sel.feature_width(&r), 2);
    }
}
