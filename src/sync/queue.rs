//! Durable, strictly ordered log of mutations recorded while offline.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};

use super::mutation::{Mutation, QueuedMutation};
use crate::db::schema::MUTATION_QUEUE;

/// Fixed storage namespace for the queue's rows.
pub const NAMESPACE: &str = "recipe-sync.mutations";

/// SQLite-backed FIFO of pending mutations.
///
/// Sequence numbers come from a persisted high-water counter: each enqueue
/// returns the previous value plus one, starting at 1, and numbers are never
/// reused after removal.
pub struct MutationQueue {
  conn: Mutex<Connection>,
}

impl MutationQueue {
  pub fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(MUTATION_QUEUE)
      .map_err(|e| eyre!("Failed to run mutation queue migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory queue: {}", e))?;
    Self::from_connection(conn)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Append a mutation, returning its sequence number.
  pub fn enqueue(&self, mutation: &Mutation) -> Result<u64> {
    let payload =
      serde_json::to_string(mutation).map_err(|e| eyre!("Failed to serialize mutation: {}", e))?;

    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let last: Option<i64> = tx
      .query_row(
        "SELECT last_sequence FROM mutation_sequence WHERE namespace = ?",
        params![NAMESPACE],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read sequence counter: {}", e))?;

    let max_existing: Option<i64> = tx
      .query_row(
        "SELECT MAX(sequence) FROM mutation_queue WHERE namespace = ?",
        params![NAMESPACE],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to read queue tail: {}", e))?;

    let sequence = last.unwrap_or(0).max(max_existing.unwrap_or(0)) + 1;

    tx.execute(
      "INSERT INTO mutation_queue (namespace, sequence, kind, payload, enqueued_at)
       VALUES (?, ?, ?, ?, ?)",
      params![
        NAMESPACE,
        sequence,
        mutation.kind().as_str(),
        payload,
        Utc::now().to_rfc3339()
      ],
    )
    .map_err(|e| eyre!("Failed to enqueue mutation: {}", e))?;

    tx.execute(
      "INSERT OR REPLACE INTO mutation_sequence (namespace, last_sequence) VALUES (?, ?)",
      params![NAMESPACE, sequence],
    )
    .map_err(|e| eyre!("Failed to advance sequence counter: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(sequence as u64)
  }

  /// The entry with the lowest sequence number.
  pub fn peek_oldest(&self) -> Result<Option<QueuedMutation>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        &format!("{} ORDER BY sequence LIMIT 1", SELECT_ENTRIES),
        params![NAMESPACE],
        read_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to read queue head: {}", e))?;

    row.map(RawEntry::into_queued).transpose()
  }

  /// Delete exactly one entry. Removing an absent sequence is a no-op, so a
  /// drain interrupted mid-removal can safely retry.
  pub fn remove(&self, sequence: u64) -> Result<bool> {
    let conn = self.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM mutation_queue WHERE namespace = ? AND sequence = ?",
        params![NAMESPACE, sequence as i64],
      )
      .map_err(|e| eyre!("Failed to remove mutation {}: {}", sequence, e))?;

    Ok(removed > 0)
  }

  /// All entries in replay order.
  pub fn list(&self) -> Result<Vec<QueuedMutation>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(&format!("{} ORDER BY sequence", SELECT_ENTRIES))
      .map_err(|e| eyre!("Failed to prepare queue listing: {}", e))?;

    let rows = stmt
      .query_map(params![NAMESPACE], read_row)
      .map_err(|e| eyre!("Failed to list queue: {}", e))?
      .collect::<rusqlite::Result<Vec<RawEntry>>>()
      .map_err(|e| eyre!("Failed to read queue row: {}", e))?;

    rows.into_iter().map(RawEntry::into_queued).collect()
  }

  pub fn len(&self) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM mutation_queue WHERE namespace = ?",
        params![NAMESPACE],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count queue: {}", e))?;

    Ok(count as usize)
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  /// Note a failed replay against an entry without moving it.
  pub fn record_failure(&self, sequence: u64, error: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "UPDATE mutation_queue SET attempts = attempts + 1, last_error = ?
         WHERE namespace = ? AND sequence = ?",
        params![error, NAMESPACE, sequence as i64],
      )
      .map_err(|e| eyre!("Failed to record replay failure for {}: {}", sequence, e))?;

    Ok(())
  }
}

const SELECT_ENTRIES: &str = "SELECT sequence, payload, enqueued_at, attempts, last_error
   FROM mutation_queue WHERE namespace = ?";

struct RawEntry {
  sequence: i64,
  payload: String,
  enqueued_at: String,
  attempts: u32,
  last_error: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
  Ok(RawEntry {
    sequence: row.get(0)?,
    payload: row.get(1)?,
    enqueued_at: row.get(2)?,
    attempts: row.get(3)?,
    last_error: row.get(4)?,
  })
}

impl RawEntry {
  fn into_queued(self) -> Result<QueuedMutation> {
    let mutation: Mutation = serde_json::from_str(&self.payload)
      .map_err(|e| eyre!("Corrupt payload for mutation {}: {}", self.sequence, e))?;
    let enqueued_at = DateTime::parse_from_rfc3339(&self.enqueued_at)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(|e| eyre!("Failed to parse datetime '{}': {}", self.enqueued_at, e))?;

    Ok(QueuedMutation {
      sequence: self.sequence as u64,
      mutation,
      enqueued_at,
      attempts: self.attempts,
      last_error: self.last_error,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;
  use crate::recipe::Meal;
  use crate::sync::mutation::MutationKind;

  fn favorite(id: &str) -> Mutation {
    Mutation::AddFavorite {
      meal: Meal::new(id),
    }
  }

  #[test]
  fn test_sequences_start_at_one_and_increase_by_one() {
    let queue = MutationQueue::open_in_memory().unwrap();
    let sequences: Vec<u64> = (0..5)
      .map(|i| queue.enqueue(&favorite(&i.to_string())).unwrap())
      .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

    let listed: Vec<u64> = queue.list().unwrap().iter().map(|m| m.sequence).collect();
    assert_eq!(listed, sequences);
  }

  #[test]
  fn test_list_preserves_enqueue_order_and_payload() {
    let queue = MutationQueue::open_in_memory().unwrap();
    queue.enqueue(&favorite("a")).unwrap();
    queue
      .enqueue(&Mutation::RemoveFavorite {
        meal_id: "a".to_string(),
      })
      .unwrap();

    let entries = queue.list().unwrap();
    assert_eq!(entries[0].kind(), MutationKind::AddFavorite);
    assert_eq!(entries[1].kind(), MutationKind::RemoveFavorite);
    assert_eq!(entries[1].mutation.meal_id(), "a");
    assert_eq!(entries[0].attempts, 0);
  }

  #[test]
  fn test_remove_is_idempotent() {
    let queue = MutationQueue::open_in_memory().unwrap();
    let first = queue.enqueue(&favorite("a")).unwrap();
    queue.enqueue(&favorite("b")).unwrap();

    assert!(queue.remove(first).unwrap());
    assert_eq!(queue.len().unwrap(), 1);
    assert!(!queue.remove(first).unwrap());
    assert_eq!(queue.len().unwrap(), 1);
    assert!(!queue.remove(999).unwrap());
  }

  #[test]
  fn test_peek_oldest_follows_removals() {
    let queue = MutationQueue::open_in_memory().unwrap();
    assert!(queue.peek_oldest().unwrap().is_none());

    let a = queue.enqueue(&favorite("a")).unwrap();
    let b = queue.enqueue(&favorite("b")).unwrap();
    assert_eq!(queue.peek_oldest().unwrap().unwrap().sequence, a);

    queue.remove(a).unwrap();
    assert_eq!(queue.peek_oldest().unwrap().unwrap().sequence, b);
  }

  #[test]
  fn test_sequences_are_not_reused_after_draining() {
    let queue = MutationQueue::open_in_memory().unwrap();
    let a = queue.enqueue(&favorite("a")).unwrap();
    queue.remove(a).unwrap();
    assert!(queue.is_empty().unwrap());

    assert_eq!(queue.enqueue(&favorite("b")).unwrap(), a + 1);
  }

  #[test]
  fn test_record_failure_keeps_position() {
    let queue = MutationQueue::open_in_memory().unwrap();
    let a = queue.enqueue(&favorite("a")).unwrap();
    queue.enqueue(&favorite("b")).unwrap();

    queue.record_failure(a, "unknown meal a").unwrap();
    queue.record_failure(a, "unknown meal a again").unwrap();

    let head = queue.peek_oldest().unwrap().unwrap();
    assert_eq!(head.sequence, a);
    assert_eq!(head.attempts, 2);
    assert_eq!(head.last_error.as_deref(), Some("unknown meal a again"));
  }

  #[test]
  fn test_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
      let queue = MutationQueue::from_connection(Database::open(dir.path()).unwrap().into_conn())
        .unwrap();
      queue.enqueue(&favorite("52772")).unwrap();
      queue.enqueue(&favorite("52773")).unwrap();
    }

    let queue =
      MutationQueue::from_connection(Database::open(dir.path()).unwrap().into_conn()).unwrap();
    let entries = queue.list().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].mutation.meal_id(), "52772");
    assert_eq!(queue.enqueue(&favorite("x")).unwrap(), 3);
  }
}
