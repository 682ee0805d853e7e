//! Cached molecular descriptor feature vectors.
//!
//! A [`DescriptorDataset`] serves `(features, label)` samples for a fixed list
//! of molecules. The feature vector of a molecule is the concatenation of the
//! active descriptor blocks of a [`BlockRegistry`]; each one is computed once
//! and then served from the cheapest tier available:
//!
//! ```text
//!   get_item(i)
//!        │
//!        ▼
//!   materialized cache ──hit──────────────────────────────┐
//!        │ miss                                             │
//!        ▼                                                  │
//!   combined per-sample cache ──hit──┐                      │
//!        │ miss                       │                      │
//!        ▼                            │                      │
//!   per block: columnar → block file → DescriptorBlock      │
//!        │                            │                      │
//!        ▼                            ▼                      │
//!   feature filter → normalization ──────────────────────▶ sample
//! ```
//!
//! Cache folders are named by an MD5 digest of the block selection, so two
//! datasets with the same active blocks share their caches.

pub mod cache;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod materialize;
pub mod normalization;

pub use cache::Tier;
pub use config::DatasetConfig;
pub use data::blocks::{BlockRegistry, BlockSelection, DescriptorBlock, FnBlock, STANDARD_BLOCK_NAMES};
pub use data::filter::{FeatureFilter, FilterSource};
pub use data::model::{Molecule, PropertyValue, Sample};
pub use dataset::DescriptorDataset;
pub use error::{DescriptorError, Result};
pub use normalization::{NormalizationStats, StatsSource};
