use thiserror::Error;

/// Errors produced by the page, pool, cache, and pager components.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A read/write offset fell below the header or past the page end.
    #[error("invalid offset {offset} (must be in [{min}, {max}])")]
    InvalidOffset { offset: usize, min: usize, max: usize },

    /// A write would have carried data past `PAGE_SIZE`.
    #[error("write of {len} bytes at offset {offset} overflows the page")]
    PageOverflow { offset: usize, len: usize },

    /// A read was requested with a zero length.
    #[error("read length must be greater than zero")]
    InvalidLength,

    /// A deserialized header's recomputed checksum did not match the stored one.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// `free_space_offset` fell outside `[HEADER_SIZE, PAGE_SIZE]`.
    #[error("free_space_offset {0} outside [{1}, {2}]")]
    InvalidFreeSpaceOffset(u16, usize, usize),

    /// `Pager::write` was asked to write an identifier it has never read or created.
    #[error("page {0} not found in pager")]
    PageNotFound(u32),

    /// The underlying file operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A pool or page allocation could not be satisfied.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

/// Convenience alias used throughout this crate.
pub type StorageResult<T> = Result<T, StorageError>;
