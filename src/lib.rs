//! A page-oriented storage core: fixed-size checksummed pages, a bounded
//! memory pool of page-sized buffers, an LRU-ish page cache, and the
//! pager that ties them to a backing file.
//!
//! This crate is the durable foundation a relational database engine's
//! higher layers (SQL parsing, query planning, transactions, indexing,
//! wire protocol) are built on top of. None of those layers live here;
//! see each module's docs for the exact boundary.
//!
//! ```no_run
//! use pagestore::{Pager, PageKind, HEADER_SIZE};
//!
//! # fn main() -> Result<(), pagestore::StorageError> {
//! let mut pager = Pager::open("example.db")?;
//! let page = pager.get(1)?;
//! assert_eq!(page.kind(), PageKind::Data);
//! page.write(HEADER_SIZE, b"hello")?;
//! pager.write(1)?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod page;
mod pager;
mod pool;

pub use cache::PageCache;
pub use error::{StorageError, StorageResult};
pub use page::{Page, PageKind, HEADER_SIZE, MAX_DATA, PAGE_SIZE};
pub use pager::{Pager, DEFAULT_CACHE_CAPACITY, DEFAULT_POOL_SIZE};
pub use pool::{Buffer, MemoryPool};
