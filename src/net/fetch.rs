use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use url::Url;

use crate::cache::{RequestKey, Response};

/// A boxed, spawnable future
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// What the requester intends to do with the response, as reported by the
/// environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  Document,
  Script,
  Style,
  Image,
  Manifest,
  /// `fetch()`/XHR calls
  Empty,
}

impl Destination {
  /// Top-level app assets served network-first from the document partition.
  pub fn is_app_asset(self) -> bool {
    matches!(self, Self::Document | Self::Script | Self::Style)
  }
}

/// An outbound content request intercepted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
  pub method: String,
  pub url: Url,
  pub destination: Destination,
}

impl ContentRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      destination: Destination::Empty,
    }
  }

  pub fn parse(url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid request url {}: {}", url, e))?;
    Ok(Self::get(url))
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_ascii_uppercase();
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, self.url.as_str())
  }
}

/// Transport used by the gateway for every network round trip.
///
/// A transport error (DNS, refused connection, timeout) is an `Err`; any HTTP
/// status, including 4xx/5xx, is an `Ok` response.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &ContentRequest) -> BoxFuture<Result<Response>>;
}

/// HTTP transport backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, request: &ContentRequest) -> BoxFuture<Result<Response>> {
    let client = self.client.clone();
    let request = request.clone();

    Box::pin(async move {
      let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

      let response = client
        .request(method, request.url.clone())
        .send()
        .await
        .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

      Ok(Response {
        status,
        headers,
        body: body.to_vec(),
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_key_uses_method_and_url() {
    let request = ContentRequest::parse("https://www.themealdb.com/images/a.jpg")
      .unwrap()
      .with_method("head");
    let key = request.key();
    assert_eq!(key.method, "HEAD");
    assert_eq!(key.url, "https://www.themealdb.com/images/a.jpg");
    assert!(!request.is_get());
  }

  #[test]
  fn test_app_asset_destinations() {
    assert!(Destination::Document.is_app_asset());
    assert!(Destination::Script.is_app_asset());
    assert!(Destination::Style.is_app_asset());
    assert!(!Destination::Image.is_app_asset());
    assert!(!Destination::Empty.is_app_asset());
  }

  #[tokio::test]
  async fn test_unreachable_host_is_transport_error() {
    let fetcher = HttpFetcher::new(Duration::from_millis(500)).unwrap();
    // Port 9 (discard) on loopback is closed in test environments
    let request = ContentRequest::parse("http://127.0.0.1:9/").unwrap();
    assert!(fetcher.fetch(&request).await.is_err());
  }
}
