use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::{Path, PathBuf};

/// Random-access storage for the bytes of a cached file.
///
/// Implementations must allocate storage lazily: writing at a large
/// offset must not allocate anything for the bytes before it.
///
/// Content at offsets that were never written is unspecified. The
/// cache never reads such offsets.
pub trait BackingStore: Send + Sync {
    /// Write all of `data` at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Read exactly `length` bytes at `offset`.
    ///
    /// Fails with [io::ErrorKind::UnexpectedEof] if the store ends
    /// before `offset + length`.
    fn read_at(&self, offset: u64, length: u64) -> io::Result<Vec<u8>>;

    /// Make sure everything written so far has reached the storage.
    fn flush(&mut self) -> io::Result<()>;

    /// Apparent size of the store, that is, the end of the last write.
    fn size(&self) -> io::Result<u64>;

    /// Bytes actually allocated for the store.
    fn disk_usage(&self) -> io::Result<u64>;

    /// Identifies the store in reports and logs.
    fn describe(&self) -> String;
}

/// A [BackingStore] kept in a sparse file.
///
/// The file is never truncated nor pre-allocated, so regions that
/// haven't been written to remain holes.
pub struct SparseFile {
    path: PathBuf,
    file: File,
}

impl SparseFile {
    /// Open the file at `path`, creating it and its parent
    /// directories if necessary.
    ///
    /// Existing content is kept.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        log::debug!("Opened backing file {path:?}");

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackingStore for SparseFile {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        // Seeking past the end and writing leaves a hole.
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;

        Ok(())
    }

    fn read_at(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        let length = usize::try_from(length)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "read too large"))?;
        let mut buf = vec![0; length];
        self.file.read_exact_at(&mut buf, offset)?;

        Ok(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;

        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn disk_usage(&self) -> io::Result<u64> {
        // blocks() takes into account actual usage, not the whole
        // file size, which might be sparse.
        Ok(self.file.metadata()?.blocks() * 512)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for SparseFile {
    fn drop(&mut self) {
        if let Err(err) = self.file.sync_data() {
            log::warn!("Failed to sync {:?}: {err}", self.path);
        }
    }
}
