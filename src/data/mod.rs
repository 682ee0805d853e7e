/// Data layer: molecules, descriptor blocks, and feature filters.
///
/// Architecture:
/// ```text
///   Molecule (id, properties)
///        │
///        ▼
///   ┌───────────────┐
///   │ BlockRegistry  │  DescriptorBlock per kind, declaration order
///   └───────────────┘
///        │  BlockSelection picks + orders the active kinds
///        ▼
///   raw feature vector (concatenated blocks)
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  FeatureFilter → retained dimensions
///   └──────────┘         ▲
///                        │ loader: .json / .csv / .parquet
/// ```

pub mod blocks;
pub mod filter;
pub mod loader;
pub mod model;
