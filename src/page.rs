//! Fixed-size, checksummed disk block image.
//!
//! A [`Page`] is the unit of I/O and addressability for the whole crate: a
//! packed header followed by a data region, serialized little-endian,
//! exactly [`PAGE_SIZE`] bytes on disk.

use crate::error::{StorageError, StorageResult};

/// Total on-disk size of a page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Size of the packed header prefix, in bytes.
///
/// The header carries nine fields (kind, flags, item_count,
/// free_space_offset, page_id, parent_id, next_page, prev_page, checksum)
/// at 1+1+2+2+4+4+4+4+4 bytes apiece, which sums to 26, not the rounder
/// 24 a first pass at this format might assume. `HEADER_SIZE` is derived
/// from the field widths rather than hand-picked, so offset arithmetic
/// (`write`/`read` bounds, `MAX_DATA`) never drifts out of sync with the
/// layout actually emitted by `serialize`.
pub const HEADER_SIZE: usize = 26;

/// Size of the data region, in bytes.
pub const MAX_DATA: usize = PAGE_SIZE - HEADER_SIZE;

const OFFSET_KIND: usize = 0;
const OFFSET_FLAGS: usize = 1;
const OFFSET_ITEM_COUNT: usize = 2;
const OFFSET_FREE_SPACE: usize = 4;
const OFFSET_PAGE_ID: usize = 6;
const OFFSET_PARENT_ID: usize = 10;
const OFFSET_NEXT_PAGE: usize = 14;
const OFFSET_PREV_PAGE: usize = 18;
const OFFSET_CHECKSUM: usize = 22;

/// Tagged kind of a page, carried verbatim through serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Data,
    Index,
    Overflow,
    Free,
    /// Any byte value this crate doesn't assign a name to. Preserved
    /// verbatim on round-trip rather than rejected or coerced.
    Reserved(u8),
}

impl PageKind {
    fn to_u8(self) -> u8 {
        match self {
            PageKind::Data => 0,
            PageKind::Index => 1,
            PageKind::Overflow => 2,
            PageKind::Free => 3,
            PageKind::Reserved(byte) => byte,
        }
    }

    fn from_u8(byte: u8) -> Self {
        match byte {
            0 => PageKind::Data,
            1 => PageKind::Index,
            2 => PageKind::Overflow,
            3 => PageKind::Free,
            other => PageKind::Reserved(other),
        }
    }
}

/// In-memory image of one 4096-byte disk block.
///
/// Owns its data inline rather than behind a separate allocation, per the
/// "back-of-struct data blob" design note this format follows: one value,
/// one allocation (or none, on the stack), no pointer chasing between
/// header and data during `serialize`/`deserialize`.
#[derive(Debug, Clone)]
pub struct Page {
    kind: PageKind,
    flags: u8,
    item_count: u16,
    free_space_offset: u16,
    page_id: u32,
    parent_id: u32,
    next_page: u32,
    prev_page: u32,
    checksum: u32,
    data: [u8; MAX_DATA],
}

impl Page {
    /// Creates a fresh page of the given kind and identifier, zero-filled,
    /// with `free_space_offset` set to `HEADER_SIZE` and a valid checksum.
    pub fn new(kind: PageKind, id: u32) -> Self {
        let mut page = Self {
            kind,
            flags: 0,
            item_count: 0,
            free_space_offset: HEADER_SIZE as u16,
            page_id: id,
            parent_id: 0,
            next_page: 0,
            prev_page: 0,
            checksum: 0,
            data: [0u8; MAX_DATA],
        };
        page.recompute_checksum();
        page
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn item_count(&self) -> u16 {
        self.item_count
    }

    pub fn set_item_count(&mut self, count: u16) {
        self.item_count = count;
        self.recompute_checksum();
    }

    pub fn page_id(&self) -> u32 {
        self.page_id
    }

    pub fn parent_id(&self) -> u32 {
        self.parent_id
    }

    pub fn set_parent_id(&mut self, parent_id: u32) {
        self.parent_id = parent_id;
        self.recompute_checksum();
    }

    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn set_next_page(&mut self, next_page: u32) {
        self.next_page = next_page;
        self.recompute_checksum();
    }

    pub fn prev_page(&self) -> u32 {
        self.prev_page
    }

    pub fn set_prev_page(&mut self, prev_page: u32) {
        self.prev_page = prev_page;
        self.recompute_checksum();
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Bytes available after the current high-water mark of written data.
    pub fn free_space(&self) -> u16 {
        PAGE_SIZE as u16 - self.free_space_offset
    }

    /// Writes `bytes` into the data region at `offset` (measured from the
    /// start of the page, i.e. `offset >= HEADER_SIZE`), advances
    /// `free_space_offset` to `offset + bytes.len()`, and recomputes the
    /// checksum.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> StorageResult<()> {
        if offset < HEADER_SIZE {
            return Err(StorageError::InvalidOffset {
                offset,
                min: HEADER_SIZE,
                max: PAGE_SIZE,
            });
        }
        let end = offset
            .checked_add(bytes.len())
            .ok_or(StorageError::PageOverflow { offset, len: bytes.len() })?;
        if end > PAGE_SIZE {
            return Err(StorageError::PageOverflow { offset, len: bytes.len() });
        }
        let data_start = offset - HEADER_SIZE;
        self.data[data_start..data_start + bytes.len()].copy_from_slice(bytes);
        self.free_space_offset = end as u16;
        self.recompute_checksum();
        Ok(())
    }

    /// Returns a borrowed view of `len` bytes starting at `offset`. Does
    /// not mutate the page.
    pub fn read(&self, offset: usize, len: usize) -> StorageResult<&[u8]> {
        if len == 0 {
            return Err(StorageError::InvalidLength);
        }
        if offset < HEADER_SIZE {
            return Err(StorageError::InvalidOffset {
                offset,
                min: HEADER_SIZE,
                max: PAGE_SIZE,
            });
        }
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= PAGE_SIZE)
            .ok_or(StorageError::InvalidOffset {
                offset,
                min: HEADER_SIZE,
                max: PAGE_SIZE,
            })?;
        let data_start = offset - HEADER_SIZE;
        Ok(&self.data[data_start..end - HEADER_SIZE])
    }

    /// Returns the entire data region.
    pub fn data(&self) -> &[u8; MAX_DATA] {
        &self.data
    }

    /// Produces the exact on-disk representation, little-endian, with a
    /// freshly recomputed checksum.
    pub fn serialize(&mut self) -> [u8; PAGE_SIZE] {
        self.recompute_checksum();
        let mut buf = [0u8; PAGE_SIZE];
        self.write_header_into(&mut buf[..HEADER_SIZE]);
        buf[HEADER_SIZE..].copy_from_slice(&self.data);
        buf
    }

    /// Parses a serialized page, verifying the checksum before accepting
    /// the header and data region.
    pub fn deserialize(buf: &[u8; PAGE_SIZE]) -> StorageResult<Self> {
        let kind = PageKind::from_u8(buf[OFFSET_KIND]);
        let flags = buf[OFFSET_FLAGS];
        let item_count = read_u16(buf, OFFSET_ITEM_COUNT);
        let free_space_offset = read_u16(buf, OFFSET_FREE_SPACE);
        let page_id = read_u32(buf, OFFSET_PAGE_ID);
        let parent_id = read_u32(buf, OFFSET_PARENT_ID);
        let next_page = read_u32(buf, OFFSET_NEXT_PAGE);
        let prev_page = read_u32(buf, OFFSET_PREV_PAGE);
        let stored_checksum = read_u32(buf, OFFSET_CHECKSUM);

        let computed = compute_checksum(
            kind, flags, item_count, free_space_offset, page_id, parent_id, next_page, prev_page,
            &buf[HEADER_SIZE..],
        );
        if computed != stored_checksum {
            return Err(StorageError::ChecksumMismatch {
                stored: stored_checksum,
                computed,
            });
        }

        let mut data = [0u8; MAX_DATA];
        data.copy_from_slice(&buf[HEADER_SIZE..]);

        Ok(Self {
            kind,
            flags,
            item_count,
            free_space_offset,
            page_id,
            parent_id,
            next_page,
            prev_page,
            checksum: stored_checksum,
            data,
        })
    }

    /// Checks I1 (free-space bounds) and I2 (checksum) without mutating.
    pub fn validate(&self) -> StorageResult<()> {
        if (self.free_space_offset as usize) < HEADER_SIZE
            || (self.free_space_offset as usize) > PAGE_SIZE
        {
            return Err(StorageError::InvalidFreeSpaceOffset(
                self.free_space_offset,
                HEADER_SIZE,
                PAGE_SIZE,
            ));
        }
        let computed = self.header_checksum();
        if computed != self.checksum {
            return Err(StorageError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            });
        }
        Ok(())
    }

    /// Zero-fills everything past the current valid prefix
    /// (`[0, free_space_offset - HEADER_SIZE)`), leaving that prefix
    /// byte-identical and the header untouched except the checksum.
    /// Idempotent.
    pub fn defragment(&mut self) {
        let valid_len = self.free_space_offset as usize - HEADER_SIZE;
        self.data[valid_len..].fill(0);
        self.recompute_checksum();
    }

    fn write_header_into(&self, out: &mut [u8]) {
        out[OFFSET_KIND] = self.kind.to_u8();
        out[OFFSET_FLAGS] = self.flags;
        out[OFFSET_ITEM_COUNT..OFFSET_ITEM_COUNT + 2]
            .copy_from_slice(&self.item_count.to_le_bytes());
        out[OFFSET_FREE_SPACE..OFFSET_FREE_SPACE + 2]
            .copy_from_slice(&self.free_space_offset.to_le_bytes());
        out[OFFSET_PAGE_ID..OFFSET_PAGE_ID + 4].copy_from_slice(&self.page_id.to_le_bytes());
        out[OFFSET_PARENT_ID..OFFSET_PARENT_ID + 4].copy_from_slice(&self.parent_id.to_le_bytes());
        out[OFFSET_NEXT_PAGE..OFFSET_NEXT_PAGE + 4].copy_from_slice(&self.next_page.to_le_bytes());
        out[OFFSET_PREV_PAGE..OFFSET_PREV_PAGE + 4].copy_from_slice(&self.prev_page.to_le_bytes());
        out[OFFSET_CHECKSUM..OFFSET_CHECKSUM + 4].copy_from_slice(&self.checksum.to_le_bytes());
    }

    fn header_checksum(&self) -> u32 {
        compute_checksum(
            self.kind,
            self.flags,
            self.item_count,
            self.free_space_offset,
            self.page_id,
            self.parent_id,
            self.next_page,
            self.prev_page,
            &self.data,
        )
    }

    fn recompute_checksum(&mut self) {
        self.checksum = self.header_checksum();
        debug_assert!(
            self.free_space_offset as usize >= HEADER_SIZE
                && self.free_space_offset as usize <= PAGE_SIZE,
            "free_space_offset escaped its bounds"
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn compute_checksum(
    kind: PageKind,
    flags: u8,
    item_count: u16,
    free_space_offset: u16,
    page_id: u32,
    parent_id: u32,
    next_page: u32,
    prev_page: u32,
    data: &[u8],
) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[kind.to_u8(), flags]);
    hasher.update(&item_count.to_le_bytes());
    hasher.update(&free_space_offset.to_le_bytes());
    hasher.update(&page_id.to_le_bytes());
    hasher.update(&parent_id.to_le_bytes());
    hasher.update(&next_page.to_le_bytes());
    hasher.update(&prev_page.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_le_bytes(bytes)
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}
