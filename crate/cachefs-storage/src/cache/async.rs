use super::{CacheReport, FileDataCache};
use crate::config::CacheConfig;
use crate::{BackingStore, CacheError, SparseFile};
use cachefs_types::ByteRanges;
use std::path;
use std::sync::Arc;
use tokio::task;

/// A [FileDataCache] usable from async code.
///
/// Every operation is run on the blocking thread pool.
pub struct FileDataCacheAsync<S = SparseFile> {
    inner: Arc<FileDataCache<S>>,
}

impl<S> Clone for FileDataCacheAsync<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl FileDataCacheAsync<SparseFile> {
    /// Async version of [FileDataCache::open].
    pub async fn open(base_dir: &path::Path, name: &str) -> Result<Self, CacheError> {
        let base_dir = base_dir.to_path_buf();
        let name = name.to_string();

        Ok(Self::new(
            task::spawn_blocking(move || FileDataCache::open(&base_dir, &name)).await??,
        ))
    }

    /// Async version of [FileDataCache::from_config].
    pub async fn from_config(config: &CacheConfig, name: &str) -> Result<Self, CacheError> {
        let config = config.clone();
        let name = name.to_string();

        Ok(Self::new(
            task::spawn_blocking(move || FileDataCache::from_config(&config, &name)).await??,
        ))
    }
}

impl<S: BackingStore + 'static> FileDataCacheAsync<S> {
    /// Create a new cache from a blocking one.
    pub fn new(inner: FileDataCache<S>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Return a reference on the blocking cache.
    pub fn blocking(&self) -> Arc<FileDataCache<S>> {
        Arc::clone(&self.inner)
    }

    /// Async version of [FileDataCache::update].
    pub async fn update(&self, data: Vec<u8>, offset: u64) -> Result<(), CacheError> {
        let inner = Arc::clone(&self.inner);

        task::spawn_blocking(move || inner.update(&data, offset)).await?
    }

    /// Async version of [FileDataCache::read].
    pub async fn read(&self, length: u64, offset: u64) -> Result<Vec<u8>, CacheError> {
        let inner = Arc::clone(&self.inner);

        task::spawn_blocking(move || inner.read(length, offset)).await?
    }

    /// Async version of [FileDataCache::missing].
    pub async fn missing(&self, length: u64, offset: u64) -> Result<ByteRanges, CacheError> {
        let inner = Arc::clone(&self.inner);

        task::spawn_blocking(move || inner.missing(length, offset)).await?
    }

    /// Async version of [FileDataCache::flush].
    pub async fn flush(&self) -> Result<(), CacheError> {
        let inner = Arc::clone(&self.inner);

        task::spawn_blocking(move || inner.flush()).await?
    }

    /// Async version of [FileDataCache::report].
    pub async fn report(&self) -> Result<CacheReport, CacheError> {
        let inner = Arc::clone(&self.inner);

        task::spawn_blocking(move || inner.report()).await?
    }
}
