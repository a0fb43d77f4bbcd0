//! Partitioned content cache for offline support.
//!
//! This module provides the storage half of the offline layer:
//! - Three partitions (document, recipe, image) with versioned names
//! - A SQLite backend that survives restarts, or a no-op backend when disabled
//! - Network-first and cache-first strategies over a single request
//! - Purging of partitions left behind by earlier versions

mod content;
mod layer;
mod response;
mod storage;
mod traits;

pub use content::ContentCache;
pub use layer::CacheLayer;
pub use response::{CachedResponse, Response};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheResult, CacheSource, Partition, PartitionNames, RequestKey};
