//! Test helpers.

use crate::BackingStore;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const BLOCK_SIZE: u64 = 4096;

/// An in-memory [BackingStore] that allocates blocks on first write.
///
/// Bytes that were never written read as zeros. Accesses are
/// counted, see [MemoryStore::access].
#[derive(Default)]
pub struct MemoryStore {
    blocks: HashMap<u64, Box<[u8]>>,
    size: u64,
    access: Arc<StoreAccess>,
}

/// Number of calls made to a [MemoryStore].
#[derive(Default, Debug)]
pub struct StoreAccess {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl StoreAccess {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access counters, which remain available after the store has
    /// been moved into a cache.
    pub fn access(&self) -> Arc<StoreAccess> {
        Arc::clone(&self.access)
    }

    /// Number of blocks allocated so far.
    pub fn allocated_blocks(&self) -> usize {
        self.blocks.len()
    }
}

impl BackingStore for MemoryStore {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.access.writes.fetch_add(1, Ordering::Relaxed);
        let mut pos = offset;
        let mut data = data;
        while !data.is_empty() {
            let block_start = pos - pos % BLOCK_SIZE;
            let in_block = (pos - block_start) as usize;
            let n = data.len().min(BLOCK_SIZE as usize - in_block);
            let block = self
                .blocks
                .entry(block_start)
                .or_insert_with(|| vec![0; BLOCK_SIZE as usize].into_boxed_slice());
            block[in_block..in_block + n].copy_from_slice(&data[..n]);
            data = &data[n..];
            pos += n as u64;
        }
        self.size = self.size.max(pos);

        Ok(())
    }

    fn read_at(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        self.access.reads.fetch_add(1, Ordering::Relaxed);
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= self.size)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        let capacity = usize::try_from(length)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "read too large"))?;
        let mut buf = Vec::with_capacity(capacity);
        let mut pos = offset;
        while pos < end {
            let block_start = pos - pos % BLOCK_SIZE;
            let in_block = (pos - block_start) as usize;
            let n = ((end - pos) as usize).min(BLOCK_SIZE as usize - in_block);
            match self.blocks.get(&block_start) {
                Some(block) => buf.extend_from_slice(&block[in_block..in_block + n]),
                None => buf.resize(buf.len() + n, 0),
            }
            pos += n as u64;
        }

        Ok(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.size)
    }

    fn disk_usage(&self) -> io::Result<u64> {
        Ok(self.blocks.len() as u64 * BLOCK_SIZE)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
