//! Bounded, batch-growing pool of page-sized byte buffers.
//!
//! Amortizes allocation cost for callers that repeatedly need a
//! [`PAGE_SIZE`]-sized, 8-byte-aligned scratch buffer (a deserialization
//! target, a pending write). A small ring absorbs the hottest releases so
//! they come back cache-resident; everything else falls back to an
//! unordered free list.

use std::collections::VecDeque;

use crate::error::{StorageError, StorageResult};
use crate::page::PAGE_SIZE;

/// Number of slots in the fast-path ring.
const RING_CAPACITY: usize = 32;

/// Number of buffers allocated per growth batch once the pool runs dry.
const GROWTH_BATCH: usize = 16;

#[repr(align(8))]
struct AlignedBytes([u8; PAGE_SIZE]);

/// A page-sized, 8-byte-aligned buffer on loan from a [`MemoryPool`].
///
/// Holders must treat the contents as uninitialized garbage: the pool
/// never zeroes a buffer on release.
pub struct Buffer {
    id: usize,
    bytes: Box<AlignedBytes>,
}

impl Buffer {
    fn new(id: usize) -> Self {
        Self {
            id,
            bytes: Box::new(AlignedBytes([0u8; PAGE_SIZE])),
        }
    }

    /// Stable identity assigned at first allocation; unchanged across
    /// `release`/`acquire` cycles, usable to confirm buffer re-use.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn as_slice(&self) -> &[u8; PAGE_SIZE] {
        &self.bytes.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.bytes.0
    }
}

/// A bounded pool of page-sized buffers with a ring-based fast path.
pub struct MemoryPool {
    free_list: Vec<Buffer>,
    ring: VecDeque<Buffer>,
    next_id: usize,
}

impl MemoryPool {
    /// Allocates `initial_pages` buffers up front onto the free list; the
    /// ring starts empty.
    pub fn new(initial_pages: usize) -> StorageResult<Self> {
        let mut pool = Self {
            free_list: Vec::new(),
            ring: VecDeque::with_capacity(RING_CAPACITY),
            next_id: 0,
        };
        pool.grow(initial_pages)?;
        Ok(pool)
    }

    /// Total number of buffers this pool has ever allocated.
    pub fn allocated_count(&self) -> usize {
        self.next_id
    }

    /// Number of buffers currently idle (free list plus ring).
    pub fn idle_count(&self) -> usize {
        self.free_list.len() + self.ring.len()
    }

    fn grow(&mut self, count: usize) -> StorageResult<()> {
        self.free_list
            .try_reserve(count)
            .map_err(|e| StorageError::OutOfMemory(e.to_string()))?;
        for _ in 0..count {
            let buffer = Buffer::new(self.next_id);
            self.next_id += 1;
            self.free_list.push(buffer);
        }
        Ok(())
    }

    /// Hands out a buffer: the ring head first, then the free list tail,
    /// growing by [`GROWTH_BATCH`] buffers if both are empty.
    pub fn acquire(&mut self) -> StorageResult<Buffer> {
        if let Some(buffer) = self.ring.pop_front() {
            return Ok(buffer);
        }
        if let Some(buffer) = self.free_list.pop() {
            return Ok(buffer);
        }
        self.grow(GROWTH_BATCH)?;
        self.free_list
            .pop()
            .ok_or_else(|| StorageError::OutOfMemory("pool growth produced no buffer".into()))
    }

    /// Returns a buffer to the pool: the ring tail if it has room, else
    /// the free list.
    pub fn release(&mut self, buffer: Buffer) {
        if self.ring.len() < RING_CAPACITY {
            self.ring.push_back(buffer);
        } else {
            self.free_list.push(buffer);
        }
    }

    /// Frees every buffer the pool has ever allocated, exactly once.
    /// Dropping a `MemoryPool` does the same thing; this exists so
    /// callers can make teardown an explicit step in their own shutdown
    /// sequence, matching [`crate::PageCache::teardown`] and
    /// [`crate::Pager::teardown`].
    pub fn teardown(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_preallocates_free_list() {
        let pool = MemoryPool::new(4).unwrap();
        assert_eq!(pool.allocated_count(), 4);
        assert_eq!(pool.idle_count(), 4);
    }

    #[test]
    fn release_then_acquire_reuses_the_ring_fast_path() {
        let mut pool = MemoryPool::new(1).unwrap();
        let b1 = pool.acquire().unwrap();
        let b1_id = b1.id();
        pool.release(b1);
        let b2 = pool.acquire().unwrap();
        assert_eq!(b2.id(), b1_id);
    }

    #[test]
    fn acquire_grows_by_batch_when_exhausted() {
        let mut pool = MemoryPool::new(1).unwrap();
        let _b1 = pool.acquire().unwrap();
        assert_eq!(pool.allocated_count(), 1);
        let _b2 = pool.acquire().unwrap();
        assert_eq!(pool.allocated_count(), 1 + GROWTH_BATCH);
    }

    #[test]
    fn ring_is_fifo_within_its_window() {
        let mut pool = MemoryPool::new(3).unwrap();
        let b1 = pool.acquire().unwrap();
        let b2 = pool.acquire().unwrap();
        let b3 = pool.acquire().unwrap();
        let (id1, id2, id3) = (b1.id(), b2.id(), b3.id());

        pool.release(b1);
        pool.release(b2);
        pool.release(b3);

        assert_eq!(pool.acquire().unwrap().id(), id1);
        assert_eq!(pool.acquire().unwrap().id(), id2);
        assert_eq!(pool.acquire().unwrap().id(), id3);
    }

    #[test]
    fn buffers_are_eight_byte_aligned() {
        let mut pool = MemoryPool::new(1).unwrap();
        let buffer = pool.acquire().unwrap();
        let ptr = buffer.as_slice().as_ptr();
        assert_eq!(ptr as usize % 8, 0);
    }

    #[test]
    fn released_buffers_are_not_zeroed() {
        let mut pool = MemoryPool::new(1).unwrap();
        let mut buffer = pool.acquire().unwrap();
        buffer.as_mut_slice()[0] = 0xAB;
        pool.release(buffer);
        let reacquired = pool.acquire().unwrap();
        assert_eq!(reacquired.as_slice()[0], 0xAB);
    }

    #[test]
    fn teardown_consumes_the_pool() {
        let pool = MemoryPool::new(2).unwrap();
        pool.teardown();
    }

    #[test]
    fn free_list_has_no_fifo_guarantee_but_ring_does() {
        // Draining straight from a freshly grown free list (bypassing the
        // ring) returns buffers in reverse allocation order, since the
        // free list is a stack, not a queue.
        let mut pool = MemoryPool::new(3).unwrap();
        let ids: Vec<_> = std::iter::from_fn(|| pool.acquire().ok().map(|b| b.id()))
            .take(3)
            .collect();
        assert_eq!(ids, vec![2, 1, 0]);
    }
}
