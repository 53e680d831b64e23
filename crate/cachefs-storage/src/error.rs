use cachefs_types::{ByteRange, ByteRanges};
use tokio::task::JoinError;

/// Error returned types in this crate.
///
/// A [CacheError::Miss] is the normal cold-cache condition; the
/// caller is expected to fetch the data, call update and retry. All
/// other errors point to a problem with the backing store or with the
/// way the cache is used.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Miss(#[from] CacheMiss),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty update at offset {0}")]
    EmptyUpdate(u64),

    #[error("{length} bytes at offset {offset} goes past the largest possible offset")]
    InvalidRange { offset: u64, length: u64 },

    #[error("invalid cache name: {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    JoinError(#[from] JoinError),
}

impl CacheError {
    /// Returns true if this error is a [CacheMiss].
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss(_))
    }

    /// Returns the [CacheMiss], if this is one.
    pub fn as_miss(&self) -> Option<&CacheMiss> {
        match self {
            CacheError::Miss(miss) => Some(miss),
            _ => None,
        }
    }
}

/// Error returned when reading a range that is not fully known.
///
/// When converted into a [std::io::Error], this error is embedded
/// into an error of kind [std::io::ErrorKind::InvalidData]. Use
/// [CacheMiss::matches] to check an I/O error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cache miss: {range} is not available locally, missing {missing}")]
pub struct CacheMiss {
    /// The range that was requested.
    pub range: ByteRange,

    /// The portions of the requested range that are unknown.
    pub missing: ByteRanges,
}

impl CacheMiss {
    /// Offset of the requested range.
    pub fn offset(&self) -> u64 {
        self.range.start
    }

    /// Length of the requested range.
    pub fn length(&self) -> u64 {
        self.range.bytecount()
    }

    /// Returns true if the given I/O error is actually a CacheMiss.
    pub fn matches(ioerr: &std::io::Error) -> bool {
        ioerr.kind() == std::io::ErrorKind::InvalidData
            && ioerr
                .get_ref()
                .map(|e| e.is::<CacheMiss>())
                .unwrap_or(false)
    }
}

impl From<CacheError> for std::io::Error {
    fn from(err: CacheError) -> Self {
        use std::io::ErrorKind;
        match err {
            CacheError::Miss(miss) => std::io::Error::new(ErrorKind::InvalidData, miss),
            CacheError::Io(err) => err,
            CacheError::JoinError(err) => std::io::Error::other(err),
            err @ (CacheError::EmptyUpdate(_)
            | CacheError::InvalidRange { .. }
            | CacheError::InvalidName(_)) => std::io::Error::new(ErrorKind::InvalidInput, err),
        }
    }
}
