//! Named cache stores for offline access.
//!
//! A store maps a request identity (method + URL) to the response last
//! written for it. Stores are created lazily on first write and are only ever
//! evicted as a whole, never entry by entry.
//!
//! - `MemoryStorage`: in-process stores, used for tests and ephemeral runs
//! - `DiskStorage`: one JSON document per store under the cache directory
//! - `CacheNames`: the versioned store names of one controller deployment

pub mod disk;
pub mod memory;
pub mod names;
pub mod storage;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use names::CacheNames;
pub use storage::{CacheStorage, StorageError};
