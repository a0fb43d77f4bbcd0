/// Partitioned response store. `key_hash` is the SHA-256 of "METHOD url".
pub const CONTENT_CACHE: &str = r#"
CREATE TABLE IF NOT EXISTS content_cache (
    partition TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (partition, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_content_cache_partition
    ON content_cache(partition);
"#;

/// Pending user mutations plus the high-water sequence counter.
pub const MUTATION_QUEUE: &str = r#"
CREATE TABLE IF NOT EXISTS mutation_queue (
    namespace TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    PRIMARY KEY (namespace, sequence)
);

CREATE TABLE IF NOT EXISTS mutation_sequence (
    namespace TEXT PRIMARY KEY,
    last_sequence INTEGER NOT NULL
);
"#;
