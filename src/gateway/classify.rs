//! Request classification: which strategy and partition serve a request.

use crate::cache::Partition;
use crate::net::ContentRequest;
use crate::recipe::Endpoints;

/// How the gateway serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  NetworkFirst(Partition),
  CacheFirst(Partition),
  /// Straight to the network, nothing cached
  Passthrough,
}

/// Classify a request. Rules are evaluated in order and the first match wins:
///
/// 1. non-GET requests are never cached
/// 2. recipe API lookups → network-first into the recipe partition
/// 3. recipe API images → cache-first into the image partition
/// 4. documents, scripts and stylesheets → network-first into the document
///    partition
/// 5. everything else passes through
pub fn classify(request: &ContentRequest, endpoints: &Endpoints) -> Route {
  if !request.is_get() {
    return Route::Passthrough;
  }
  if endpoints.is_lookup(&request.url) {
    return Route::NetworkFirst(Partition::Recipe);
  }
  if endpoints.is_image(&request.url) {
    return Route::CacheFirst(Partition::Image);
  }
  if request.destination.is_app_asset() {
    return Route::NetworkFirst(Partition::Document);
  }
  Route::Passthrough
}
