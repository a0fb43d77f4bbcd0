//! SQLite connection management for the offline database.
//!
//! Content cache entries and the mutation queue share one database file
//! (`offline.db`) but use separate connections, each guarded by its own mutex.

pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the offline database inside the data directory
pub const DB_FILE: &str = "offline.db";

/// Both stores write to the same file from separate connections
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create the database inside `data_dir`
  pub fn open(data_dir: &Path) -> Result<Self> {
    let path = Self::path_in(data_dir);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    let db = Self { conn };
    db.run_migrations()?;

    Ok(db)
  }

  /// Open a private in-memory database (tests, disabled persistence)
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let db = Self { conn };
    db.run_migrations()?;

    Ok(db)
  }

  /// Full path of the database file for a data directory
  pub fn path_in(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .conn
      .busy_timeout(BUSY_TIMEOUT)
      .map_err(|e| eyre!("Failed to configure database: {}", e))?;
    self
      .conn
      .execute_batch(schema::CONTENT_CACHE)
      .map_err(|e| eyre!("Failed to run content cache migrations: {}", e))?;
    self
      .conn
      .execute_batch(schema::MUTATION_QUEUE)
      .map_err(|e| eyre!("Failed to run mutation queue migrations: {}", e))?;
    Ok(())
  }

  /// Hand the connection over to a store
  pub fn into_conn(self) -> Connection {
    self.conn
  }
}
