//! Response bodies as stored in and served from the content cache.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const CONTENT_TYPE: &str = "content-type";

/// A response as seen by the cache: status, headers and the full body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  /// Header names are stored lowercased
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  /// A 200 JSON response.
  pub fn json(body: impl Into<Vec<u8>>) -> Self {
    Self::new(200, body).with_header(CONTENT_TYPE, "application/json")
  }

  /// Synthetic placeholder returned when an image can be neither served
  /// from cache nor fetched.
  pub fn not_found() -> Self {
    Self::new(404, "Not Found").with_header(CONTENT_TYPE, "text/plain")
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  /// True for 2xx statuses; only these are written to the cache.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get(CONTENT_TYPE).map(String::as_str)
  }
}

/// A stored cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub response: Response,
  /// When the entry was written
  pub stored_at: DateTime<Utc>,
}
