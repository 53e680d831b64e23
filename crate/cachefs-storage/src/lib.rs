//! Local, disk-backed cache for byte ranges of large files.
//!
//! See [FileDataCache].

mod cache;
pub mod config;
mod error;
mod sparse;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{CacheReport, FileDataCache, FileDataCacheAsync};
pub use cachefs_types::{ByteRange, ByteRanges};
pub use config::CacheConfig;
pub use error::{CacheError, CacheMiss};
pub use sparse::{BackingStore, SparseFile};
