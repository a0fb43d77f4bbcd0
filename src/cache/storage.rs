//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::response::{CachedResponse, Response};
use super::traits::RequestKey;
use crate::db::schema::CONTENT_CACHE;

/// Trait for cache storage backends.
///
/// Partitions are addressed by their full versioned name so that entries left
/// behind by earlier versions stay reachable for purging.
pub trait CacheStorage: Send + Sync {
  /// Store or overwrite a response.
  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Get a stored response.
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Delete a stored response, returning whether one existed.
  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool>;

  /// Delete every partition not named in `current`; returns rows removed.
  fn purge_stale(&self, current: &BTreeSet<String>) -> Result<usize>;

  /// Names of all partitions holding at least one entry.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Number of entries in a partition.
  fn count(&self, partition: &str) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn put(&self, _partition: &str, _key: &RequestKey, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }

  fn get(&self, _partition: &str, _key: &RequestKey) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn delete(&self, _partition: &str, _key: &RequestKey) -> Result<bool> {
    Ok(false)
  }

  fn purge_stale(&self, _current: &BTreeSet<String>) -> Result<usize> {
    Ok(0)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn count(&self, _partition: &str) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Wrap an open connection, creating the cache table if needed.
  pub fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CONTENT_CACHE)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::from_connection(conn)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for SqliteStorage {
  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO content_cache
           (partition, key_hash, method, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          partition,
          key.cache_hash(),
          key.method,
          key.url,
          response.status,
          headers,
          response.body,
          Utc::now().to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store {} in {}: {}", key, partition, e))?;

    Ok(())
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, stored_at FROM content_cache
         WHERE partition = ? AND key_hash = ?",
        params![partition, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {} from {}: {}", key, partition, e))?;

    match row {
      Some((status, headers, body, stored_at)) => {
        let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(CachedResponse {
          response: Response {
            status,
            headers,
            body,
          },
          stored_at: parse_datetime(&stored_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    let conn = self.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM content_cache WHERE partition = ? AND key_hash = ?",
        params![partition, key.cache_hash()],
      )
      .map_err(|e| eyre!("Failed to delete {} from {}: {}", key, partition, e))?;

    Ok(removed > 0)
  }

  fn purge_stale(&self, current: &BTreeSet<String>) -> Result<usize> {
    let mut conn = self.lock()?;

    // Rolls back on drop if any step below fails
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let stale: Vec<String> = {
      let mut stmt = tx
        .prepare("SELECT DISTINCT partition FROM content_cache")
        .map_err(|e| eyre!("Failed to prepare partition query: {}", e))?;
      let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| eyre!("Failed to list partitions: {}", e))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(|e| eyre!("Failed to read partition names: {}", e))?;
      names.into_iter().filter(|name| !current.contains(name)).collect()
    };

    let mut removed = 0;
    for name in &stale {
      removed += tx
        .execute("DELETE FROM content_cache WHERE partition = ?", params![name])
        .map_err(|e| eyre!("Failed to purge partition {}: {}", name, e))?;
    }

    tx.commit().map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT partition FROM content_cache ORDER BY partition")
      .map_err(|e| eyre!("Failed to prepare partition query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition names: {}", e))?;

    Ok(names)
  }

  fn count(&self, partition: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM content_cache WHERE partition = ?",
        params![partition],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count partition {}: {}", partition, e))?;

    Ok(count as usize)
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key(path: &str) -> RequestKey {
    RequestKey::get(format!("https://www.themealdb.com{}", path))
  }

  #[test]
  fn test_put_get_overwrite() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("/api/json/v1/1/lookup.php?i=1");

    storage.put("recipe-v1", &k, &Response::json("old")).unwrap();
    storage.put("recipe-v1", &k, &Response::json("new")).unwrap();

    let cached = storage.get("recipe-v1", &k).unwrap().unwrap();
    assert_eq!(cached.response.body, b"new");
    assert_eq!(cached.response.content_type(), Some("application/json"));
    assert_eq!(storage.count("recipe-v1").unwrap(), 1);
  }

  #[test]
  fn test_partitions_are_isolated() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("/x");

    storage.put("doc-v1", &k, &Response::new(200, "a")).unwrap();
    assert!(storage.get("recipe-v1", &k).unwrap().is_none());
    assert!(storage.get("doc-v1", &k).unwrap().is_some());
  }

  #[test]
  fn test_delete_reports_presence() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let k = key("/x");

    storage.put("doc-v1", &k, &Response::new(200, "a")).unwrap();
    assert!(storage.delete("doc-v1", &k).unwrap());
    assert!(!storage.delete("doc-v1", &k).unwrap());
  }

  #[test]
  fn test_purge_keeps_current_partitions() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    for name in ["doc-v1", "recipe-v1", "image-v2"] {
      storage.put(name, &key("/x"), &Response::new(200, "a")).unwrap();
    }

    let current: BTreeSet<String> = ["image-v2".to_string()].into_iter().collect();
    assert_eq!(storage.purge_stale(&current).unwrap(), 2);
    assert_eq!(storage.partitions().unwrap(), vec!["image-v2".to_string()]);
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    let k = key("/x");
    storage.put("doc-v1", &k, &Response::new(200, "a")).unwrap();
    assert!(storage.get("doc-v1", &k).unwrap().is_none());
    assert!(!storage.delete("doc-v1", &k).unwrap());
  }

  #[test]
  fn test_purge_while_locked_fails_and_keeps_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    let conn = Connection::open(&path).unwrap();
    conn.busy_timeout(std::time::Duration::from_millis(50)).unwrap();
    let storage = SqliteStorage::from_connection(conn).unwrap();
    storage.put("doc-v1", &key("/x"), &Response::new(200, "a")).unwrap();

    let other = Connection::open(&path).unwrap();
    other.execute_batch("BEGIN EXCLUSIVE").unwrap();

    let current: BTreeSet<String> = ["doc-v2".to_string()].into_iter().collect();
    assert!(storage.purge_stale(&current).is_err());
    assert!(storage.partitions().is_err());

    other.execute_batch("COMMIT").unwrap();

    // No transaction was left open by the failed attempt
    assert_eq!(storage.partitions().unwrap(), vec!["doc-v1".to_string()]);
    assert_eq!(storage.purge_stale(&current).unwrap(), 1);
    assert!(storage.partitions().unwrap().is_empty());
  }
}
