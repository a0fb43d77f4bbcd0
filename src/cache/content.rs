//! The content cache as seen by strategies and the gateway.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::response::{CachedResponse, Response};
use super::storage::CacheStorage;
use super::traits::{Partition, PartitionNames, RequestKey};

/// Partitioned key→response store with soft-failure semantics.
///
/// Storage errors never reach callers: a failed `put` is logged and dropped,
/// and a failed `get` reads as a miss, so strategies degrade exactly as they
/// would for an absent key.
#[derive(Clone)]
pub struct ContentCache {
  storage: Arc<dyn CacheStorage>,
  names: PartitionNames,
}

impl ContentCache {
  pub fn new(storage: Arc<dyn CacheStorage>, names: PartitionNames) -> Self {
    Self { storage, names }
  }

  pub fn names(&self) -> &PartitionNames {
    &self.names
  }

  /// Store or overwrite an entry.
  pub fn put(&self, partition: Partition, key: &RequestKey, response: &Response) {
    let name = self.names.name(partition);
    match self.storage.put(&name, key, response) {
      Ok(()) => debug!(partition = %name, key = %key, "cached"),
      Err(e) => warn!(partition = %name, key = %key, error = %e, "cache write failed"),
    }
  }

  pub fn get(&self, partition: Partition, key: &RequestKey) -> Option<CachedResponse> {
    let name = self.names.name(partition);
    match self.storage.get(&name, key) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(partition = %name, key = %key, error = %e, "cache read failed");
        None
      }
    }
  }

  /// Remove an entry; true if something was removed.
  pub fn delete(&self, partition: Partition, key: &RequestKey) -> bool {
    let name = self.names.name(partition);
    match self.storage.delete(&name, key) {
      Ok(removed) => removed,
      Err(e) => {
        warn!(partition = %name, key = %key, error = %e, "cache delete failed");
        false
      }
    }
  }

  /// Drop every partition whose name is not in `current`.
  pub fn purge_stale(&self, current: &BTreeSet<String>) -> usize {
    match self.storage.purge_stale(current) {
      Ok(removed) => removed,
      Err(e) => {
        warn!(error = %e, "cache purge failed");
        0
      }
    }
  }

  /// Partition names currently holding entries, including stale ones.
  pub fn partitions(&self) -> Vec<String> {
    self.storage.partitions().unwrap_or_else(|e| {
      warn!(error = %e, "failed to list cache partitions");
      Vec::new()
    })
  }

  pub fn len(&self, partition: Partition) -> usize {
    self
      .storage
      .count(&self.names.name(partition))
      .unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;
  use color_eyre::{eyre::eyre, Result};

  /// Storage that refuses every write, like a full disk.
  struct FullStorage;

  impl CacheStorage for FullStorage {
    fn put(&self, _: &str, _: &RequestKey, _: &Response) -> Result<()> {
      Err(eyre!("database or disk is full"))
    }
    fn get(&self, _: &str, _: &RequestKey) -> Result<Option<CachedResponse>> {
      Err(eyre!("database or disk is full"))
    }
    fn delete(&self, _: &str, _: &RequestKey) -> Result<bool> {
      Err(eyre!("database or disk is full"))
    }
    fn purge_stale(&self, _: &BTreeSet<String>) -> Result<usize> {
      Err(eyre!("database or disk is full"))
    }
    fn partitions(&self) -> Result<Vec<String>> {
      Ok(Vec::new())
    }
    fn count(&self, _: &str) -> Result<usize> {
      Ok(0)
    }
  }

  #[test]
  fn test_storage_exhaustion_is_soft() {
    let cache = ContentCache::new(Arc::new(FullStorage), PartitionNames::new("v1"));
    let key = RequestKey::get("https://www.themealdb.com/x");

    cache.put(Partition::Recipe, &key, &Response::json("{}"));
    assert!(cache.get(Partition::Recipe, &key).is_none());
    assert!(!cache.delete(Partition::Recipe, &key));
    assert_eq!(cache.purge_stale(&BTreeSet::new()), 0);
  }

  #[test]
  fn test_partition_routing_uses_version() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let cache = ContentCache::new(storage.clone(), PartitionNames::new("v9"));
    let key = RequestKey::get("https://www.themealdb.com/x");

    cache.put(Partition::Image, &key, &Response::new(200, "img"));
    assert_eq!(cache.partitions(), vec!["image-v9".to_string()]);
    assert_eq!(cache.len(Partition::Image), 1);
    assert_eq!(cache.len(Partition::Recipe), 0);
  }
}
