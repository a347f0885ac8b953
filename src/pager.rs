//! The façade between the on-disk file and callers: maps page identifiers
//! to byte offsets, reads and writes pages through the file, and keeps
//! recently-accessed pages resident via an internal [`PageCache`] and
//! [`MemoryPool`].

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::cache::PageCache;
use crate::error::{StorageError, StorageResult};
use crate::page::{Page, PageKind, PAGE_SIZE};
use crate::pool::MemoryPool;

/// Default number of resident pages kept in the pager's cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Default number of buffers the pager's pool preallocates.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Owns the backing file and the in-memory page table built on top of it.
///
/// Keeps no second, separate raw map alongside a `PageCache`: the
/// `PageCache` instance *is* the pager's resident-page table, with its
/// recency policy applied directly rather than duplicated.
pub struct Pager {
    file: File,
    cache: PageCache,
    pool: MemoryPool,
    file_size: u64,
}

impl Pager {
    /// Opens (or creates) the backing file in read/write,
    /// create-if-missing, never-truncate mode, with default cache and
    /// pool sizing.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_capacity(path, DEFAULT_CACHE_CAPACITY, DEFAULT_POOL_SIZE)
    }

    /// Same as [`Self::open`] with explicit cache and pool sizing.
    pub fn with_capacity<P: AsRef<Path>>(
        path: P,
        cache_capacity: usize,
        pool_size: usize,
    ) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            cache: PageCache::new(cache_capacity),
            pool: MemoryPool::new(pool_size)?,
            file_size,
        })
    }

    /// High-water mark of bytes written to the backing file.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of whole pages covered by [`Self::file_size`].
    pub fn page_count(&self) -> u64 {
        self.file_size / PAGE_SIZE as u64
    }

    fn offset_of(id: u32) -> u64 {
        id as u64 * PAGE_SIZE as u64
    }

    /// Returns the page for `id`, reading it from disk (or minting a
    /// fresh `Data` page for unallocated tail space) if it isn't already
    /// resident.
    pub fn get(&mut self, id: u32) -> StorageResult<&mut Page> {
        if self.cache.contains(id) {
            return Ok(self.cache.get(id).expect("just confirmed presence"));
        }

        let offset = Self::offset_of(id);
        let mut buffer = self.pool.acquire()?;
        let bytes_read = read_full_or_eof(&self.file, buffer.as_mut_slice(), offset)?;

        let page = if bytes_read == 0 {
            log::trace!("pager: page {id} unallocated, minting fresh Data page");
            self.pool.release(buffer);
            Page::new(PageKind::Data, id)
        } else if bytes_read == PAGE_SIZE {
            log::trace!("pager: cold read of page {id}");
            let result = Page::deserialize(buffer.as_slice());
            self.pool.release(buffer);
            result?
        } else {
            self.pool.release(buffer);
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short read of page {id}: got {bytes_read} of {PAGE_SIZE} bytes"),
            )));
        };

        self.cache.put(page);
        Ok(self.cache.get(id).expect("just inserted"))
    }

    /// Serializes the resident page for `id` and writes it to disk at its
    /// identifier-derived offset, advancing [`Self::file_size`].
    pub fn write(&mut self, id: u32) -> StorageResult<()> {
        let offset = Self::offset_of(id);
        let buf = {
            let page = self
                .cache
                .peek_mut(id)
                .ok_or(StorageError::PageNotFound(id))?;
            page.serialize()
        };
        write_full_at(&self.file, &buf, offset)?;
        self.file_size = self.file_size.max(offset + PAGE_SIZE as u64);
        Ok(())
    }

    /// Writes each of `ids` in ascending order, regardless of input
    /// order, producing strictly non-decreasing file offsets.
    /// Duplicates are not deduplicated: each occurrence writes again.
    pub fn write_batch(&mut self, ids: &[u32]) -> StorageResult<()> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        for id in sorted {
            self.write(id)?;
        }
        Ok(())
    }

    /// Drops all resident pages and closes the backing file.
    pub fn teardown(mut self) {
        self.cache.teardown();
    }
}

fn read_full_or_eof(file: &File, buf: &mut [u8; PAGE_SIZE], offset: u64) -> std::io::Result<usize> {
    let mut total = 0usize;
    loop {
        let n = file.read_at(&mut buf[total..], offset + total as u64)?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    Ok(total)
}

fn write_full_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    let mut written = 0usize;
    while written < buf.len() {
        let n = file.write_at(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole page",
            ));
        }
        written += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    struct TestContext {
        path: PathBuf,
    }

    impl TestContext {
        fn new(test_name: &str) -> Self {
            let path = std::env::temp_dir().join(format!("pagestore_test_{test_name}.db"));
            if path.exists() {
                let _ = fs::remove_file(&path);
            }
            Self { path }
        }
    }

    impl Drop for TestContext {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    #[test]
    fn write_read_round_trip_across_reopen() {
        let ctx = TestContext::new("round_trip");

        {
            let mut pager = Pager::open(&ctx.path).unwrap();
            let page = pager.get(1).unwrap();
            page.write(crate::page::HEADER_SIZE + 32, b"Hello, Database!").unwrap();
            pager.write(1).unwrap();
            pager.teardown();
        }

        {
            let mut pager = Pager::open(&ctx.path).unwrap();
            let page = pager.get(1).unwrap();
            assert_eq!(
                page.read(crate::page::HEADER_SIZE + 32, 17).unwrap(),
                b"Hello, Database!"
            );
        }
    }

    #[test]
    fn reading_unallocated_identifier_mints_a_fresh_data_page() {
        let ctx = TestContext::new("fresh_page");
        let mut pager = Pager::open(&ctx.path).unwrap();
        let page = pager.get(5).unwrap();
        assert_eq!(page.page_id(), 5);
        assert_eq!(page.kind(), PageKind::Data);

        pager.write(5).unwrap();
        assert_eq!(pager.file_size(), 6 * PAGE_SIZE as u64);
    }

    #[test]
    fn checksum_mismatch_on_reopen_is_rejected() {
        let ctx = TestContext::new("checksum_mismatch");
        {
            let mut pager = Pager::open(&ctx.path).unwrap();
            let page = pager.get(0).unwrap();
            page.write(crate::page::HEADER_SIZE, b"data").unwrap();
            pager.write(0).unwrap();
            pager.teardown();
        }

        // Flip a byte inside the data region directly on disk.
        use std::io::{Seek, SeekFrom, Write};
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(&ctx.path)
            .unwrap();
        file.seek(SeekFrom::Start(crate::page::HEADER_SIZE as u64 + 1))
            .unwrap();
        file.write_all(&[0xFF]).unwrap();
        drop(file);

        let mut pager = Pager::open(&ctx.path).unwrap();
        let err = pager.get(0).unwrap_err();
        assert!(matches!(err, StorageError::ChecksumMismatch { .. }));
    }

    #[test]
    fn write_of_identifier_not_in_pager_fails() {
        let ctx = TestContext::new("page_not_found");
        let mut pager = Pager::open(&ctx.path).unwrap();
        let err = pager.write(42).unwrap_err();
        assert!(matches!(err, StorageError::PageNotFound(42)));
    }

    #[test]
    fn write_batch_issues_ascending_offsets_regardless_of_input_order() {
        let ctx = TestContext::new("batch_order");
        let mut pager = Pager::open(&ctx.path).unwrap();
        for id in [5u32, 1, 3] {
            pager.get(id).unwrap();
        }
        pager.write_batch(&[5, 1, 3]).unwrap();
        assert_eq!(pager.file_size(), 6 * PAGE_SIZE as u64);
    }

    #[test]
    fn write_batch_does_not_deduplicate_identifiers() {
        let ctx = TestContext::new("batch_duplicates");
        let mut pager = Pager::open(&ctx.path).unwrap();
        pager.get(2).unwrap();
        // Two writes for the same id; both should succeed without error.
        pager.write_batch(&[2, 2]).unwrap();
    }
}
