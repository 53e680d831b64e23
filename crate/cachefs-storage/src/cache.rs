//! A local cache for byte ranges of a large, possibly sparse, file.
//!
//! Callers push the ranges they fetched with [FileDataCache::update]
//! and get them back with [FileDataCache::read]. A read of a range
//! that is not entirely known fails with a [CacheMiss], which the
//! caller resolves by fetching the data, updating and reading again.

use crate::config::CacheConfig;
use crate::{BackingStore, CacheError, CacheMiss, SparseFile};
use cachefs_types::{ByteRange, ByteRanges};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

mod r#async;

pub use r#async::FileDataCacheAsync;

/// Cache for the content of a single file.
///
/// The cache keeps track of the ranges of the file that are known in
/// memory and stores the bytes themselves in a [BackingStore],
/// usually a [SparseFile].
///
/// Updates are serialized. Reads can run in parallel with each other,
/// but never with an update, so a read never sees a known range
/// whose bytes haven't been written yet.
pub struct FileDataCache<S = SparseFile> {
    name: String,
    sync_on_update: bool,
    state: RwLock<CacheState<S>>,
}

struct CacheState<S> {
    known: ByteRanges,
    store: S,
}

impl FileDataCache<SparseFile> {
    /// Open a cache for the file called `name`, stored under
    /// `base_dir`.
    ///
    /// The backing file is created if necessary. Leading slashes in
    /// `name` are ignored, so `/foo/bar` is stored as
    /// `base_dir/foo/bar`.
    ///
    /// Known ranges are not persisted, so a new cache starts empty
    /// even if the backing file already has content.
    pub fn open(base_dir: &Path, name: &str) -> Result<Self, CacheError> {
        let path = backing_path(base_dir, name)?;
        let store = SparseFile::open(&path)?;

        Ok(Self::with_store(store, name))
    }

    /// Open a cache for the file called `name`, as configured.
    pub fn from_config(config: &CacheConfig, name: &str) -> Result<Self, CacheError> {
        let mut cache = Self::open(&config.base_dir, name)?;
        cache.sync_on_update = config.sync_on_update;

        Ok(cache)
    }

    /// Path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.read_state().store.path().to_path_buf()
    }
}

impl<S: BackingStore> FileDataCache<S> {
    /// Create a cache on top of the given store.
    ///
    /// The store is assumed to have no known content.
    pub fn with_store(store: S, name: &str) -> Self {
        Self {
            name: name.to_string(),
            sync_on_update: false,
            state: RwLock::new(CacheState {
                known: ByteRanges::new(),
                store,
            }),
        }
    }

    /// Name of the cached file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write `data` at `offset` and mark the range as known.
    ///
    /// Whatever was at that range before is overwritten. An empty
    /// update is a programming error and fails with
    /// [CacheError::EmptyUpdate].
    pub fn update(&self, data: &[u8], offset: u64) -> Result<(), CacheError> {
        if data.is_empty() {
            return Err(CacheError::EmptyUpdate(offset));
        }
        let range = checked_range(offset, data.len() as u64)?;

        let mut state = self.write_state();
        state.store.write_at(offset, data)?;
        if self.sync_on_update {
            state.store.flush()?;
        }
        state.known.add(&range);
        log::debug!(
            "[{}] updated {range}, {} known range(s)",
            self.name,
            state.known.len()
        );

        Ok(())
    }

    /// Read `length` bytes at `offset`.
    ///
    /// Fails with [CacheError::Miss] unless the whole range is known;
    /// the backing store is not accessed at all in that case. A read
    /// of zero bytes always succeeds.
    pub fn read(&self, length: u64, offset: u64) -> Result<Vec<u8>, CacheError> {
        let range = checked_range(offset, length)?;
        if range.is_empty() {
            return Ok(vec![]);
        }

        let state = self.read_state();
        if !state.known.contains_range(&range) {
            let missing = state.known.missing(&range);
            log::debug!("[{}] miss {range}, missing {missing}", self.name);
            return Err(CacheMiss { range, missing }.into());
        }

        Ok(state.store.read_at(offset, length)?)
    }

    /// Returns the portions of the given range that are not known.
    pub fn missing(&self, length: u64, offset: u64) -> Result<ByteRanges, CacheError> {
        let range = checked_range(offset, length)?;

        Ok(self.read_state().known.missing(&range))
    }

    /// A snapshot of the known ranges.
    pub fn known_ranges(&self) -> ByteRanges {
        self.read_state().known.clone()
    }

    /// Make sure all data written so far has reached the backing
    /// store.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.write_state().store.flush()?;

        Ok(())
    }

    /// Describe the state of the cache, for debugging.
    pub fn report(&self) -> Result<CacheReport, CacheError> {
        let state = self.read_state();

        Ok(CacheReport {
            name: self.name.clone(),
            store: state.store.describe(),
            size: state.store.size()?,
            disk_usage: state.store.disk_usage()?,
            known: state.known.clone(),
        })
    }

    /// Turn this cache into one that can be used from async code.
    pub fn into_async(self) -> FileDataCacheAsync<S>
    where
        S: 'static,
    {
        FileDataCacheAsync::new(self)
    }

    // The state is only modified after the store write succeeded, so
    // it is consistent even if a panic poisoned the lock.
    fn read_state(&self) -> RwLockReadGuard<'_, CacheState<S>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState<S>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State of a [FileDataCache], as returned by [FileDataCache::report].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CacheReport {
    /// Name of the cached file.
    pub name: String,
    /// Backing store, as described by [BackingStore::describe].
    pub store: String,
    /// Apparent size of the backing store.
    pub size: u64,
    /// Bytes actually used by the backing store.
    pub disk_usage: u64,
    /// Known ranges.
    pub known: ByteRanges,
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}): size {}, disk usage {}, {} bytes known in {} range(s)",
            self.name,
            self.store,
            self.size,
            self.disk_usage,
            self.known.bytecount(),
            self.known.len()
        )?;
        for (offset, length) in self.known.lengths() {
            writeln!(f, "  {offset}: {length}")?;
        }

        Ok(())
    }
}

fn checked_range(offset: u64, length: u64) -> Result<ByteRange, CacheError> {
    ByteRange::with_len(offset, length).ok_or(CacheError::InvalidRange { offset, length })
}

/// Build the path of the backing file for `name`.
fn backing_path(base_dir: &Path, name: &str) -> Result<PathBuf, CacheError> {
    let relative = Path::new(name.trim_start_matches('/'));
    let mut components = relative.components().peekable();
    if components.peek().is_none() || !components.all(|c| matches!(c, Component::Normal(_))) {
        return Err(CacheError::InvalidName(name.to_string()));
    }

    Ok(base_dir.join(relative))
}
