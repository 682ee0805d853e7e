/// Disk cache tiers for raw feature vectors.
///
/// ```text
///   <cacheRoot>/<selectionDigest>/<id>.cache           combined (vector, label)
///   <dataRoot>/modular_repr_cache/<Block>/<id>.cache   per-block files
///   <dataRoot>/modular_repr_cache_columnar/<Block>.parquet
/// ```

pub mod block_store;
pub mod columnar;
pub mod combined;
pub mod digest;
pub mod io;
pub mod tiered;

pub use block_store::{BlockFileCache, BlockStore};
pub use columnar::ColumnarCache;
pub use combined::CombinedCache;
pub use tiered::{Tier, TierCounters, TieredCache};
