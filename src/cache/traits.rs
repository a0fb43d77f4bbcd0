//! Core types for the content cache: partitions, request identity and
//! strategy results.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;

/// Named subdivision of the content cache, each with its own refresh policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
  /// Application shell, scripts and stylesheets (network-first)
  Document,
  /// Recipe lookup JSON (network-first, seedable)
  Recipe,
  /// Recipe images (cache-first, never evicted by the fetch path)
  Image,
}

impl Partition {
  pub const ALL: [Partition; 3] = [Partition::Document, Partition::Recipe, Partition::Image];

  fn prefix(self) -> &'static str {
    match self {
      Self::Document => "doc",
      Self::Recipe => "recipe",
      Self::Image => "image",
    }
  }
}

/// Versioned partition naming, e.g. `recipe-v3`.
///
/// Bumping the version on release lets activation drop every partition
/// written by an earlier deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
  version: String,
}

impl PartitionNames {
  pub fn new(version: impl Into<String>) -> Self {
    Self {
      version: version.into(),
    }
  }

  pub fn name(&self, partition: Partition) -> String {
    format!("{}-{}", partition.prefix(), self.version)
  }

  /// The three names owned by this version.
  pub fn current(&self) -> BTreeSet<String> {
    Partition::ALL.iter().map(|p| self.name(*p)).collect()
  }
}

/// Request identity used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: impl Into<String>) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: url.into(),
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new("GET", url)
  }

  /// SHA256 hash for stable, fixed-length keys
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Result from a strategy, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh data from the network.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// A cache hit served without touching the network.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Network failed, serving what the cache had.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  pub fn placeholder(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Placeholder,
      cached_at: None,
    }
  }

  pub fn passthrough(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Passthrough,
      cached_at: None,
    }
  }
}

/// Indicates where served data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Cache-first hit, network never consulted
  Cache,
  /// Network unavailable, serving cached data
  Offline,
  /// Neither cache nor network could answer
  Placeholder,
  /// Request was not eligible for caching
  Passthrough,
}
