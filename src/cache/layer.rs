//! Fetch strategies that mediate a single request through the content cache.

use color_eyre::Result;
use std::future::Future;
use tracing::debug;

use super::content::ContentCache;
use super::response::Response;
use super::traits::{CacheResult, Partition, RequestKey};

/// Cache layer that pairs the content cache with network fetching.
///
/// The `fetcher` closures are only invoked when the strategy needs the
/// network, which lets callers (and tests) observe exactly when a fetch
/// happens.
#[derive(Clone)]
pub struct CacheLayer {
  cache: ContentCache,
}

impl CacheLayer {
  pub fn new(cache: ContentCache) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &ContentCache {
    &self.cache
  }

  /// Network-first with cache fallback.
  ///
  /// 1. Fetch from network
  /// 2. On a 2xx response, overwrite the cache and return it
  /// 3. On a non-2xx response, return it without caching
  /// 4. On network failure, return the cached entry or propagate the failure
  pub async fn network_first<F, Fut>(
    &self,
    partition: Partition,
    key: &RequestKey,
    fetcher: F,
  ) -> Result<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    match fetcher().await {
      Ok(response) => {
        if response.is_ok() {
          self.cache.put(partition, key, &response);
        }
        Ok(CacheResult::from_network(response))
      }
      Err(e) => match self.cache.get(partition, key) {
        Some(cached) => {
          debug!(key = %key, error = %e, "network failed, serving cached copy");
          Ok(CacheResult::offline(cached.response, cached.stored_at))
        }
        None => Err(e),
      },
    }
  }

  /// Cache-first with network fallback.
  ///
  /// 1. Serve a cached entry without touching the network
  /// 2. On a miss, fetch; cache and return 2xx responses
  /// 3. On network failure, return a "not found" placeholder
  ///
  /// Never fails.
  pub async fn cache_first<F, Fut>(
    &self,
    partition: Partition,
    key: &RequestKey,
    fetcher: F,
  ) -> CacheResult<Response>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    if let Some(cached) = self.cache.get(partition, key) {
      return CacheResult::from_cache(cached.response, cached.stored_at);
    }

    match fetcher().await {
      Ok(response) => {
        if response.is_ok() {
          self.cache.put(partition, key, &response);
        }
        CacheResult::from_network(response)
      }
      Err(e) => {
        debug!(key = %key, error = %e, "network failed on cache miss, serving placeholder");
        CacheResult::placeholder(Response::not_found())
      }
    }
  }
}
