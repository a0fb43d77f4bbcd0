//! The cache gateway: intercepts content requests and serves the seed/evict
//! message protocol.
//!
//! The gateway runs on its own task once [`CacheGateway::spawn`] is called and
//! is reached only through a [`GatewayHandle`]. Messages are processed in the
//! order they are received; content fetches are served concurrently.

mod classify;
mod message;

pub use classify::{classify, Route};
pub use message::GatewayMessage;

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheResult, ContentCache, Partition, RequestKey, Response};
use crate::config::Config;
use crate::net::{ContentRequest, Destination, Fetcher};
use crate::recipe::{Endpoints, LookupResponse, Meal};

/// Detached image-caching tasks started while handling a message.
///
/// Dropping a handle does not cancel the task.
pub type ImageTasks = Vec<JoinHandle<()>>;

/// Service-worker equivalent sitting between the app and the network.
#[derive(Clone)]
pub struct CacheGateway {
  layer: CacheLayer,
  endpoints: Endpoints,
  fetcher: Arc<dyn Fetcher>,
  shell: Vec<Url>,
}

impl CacheGateway {
  pub fn new(config: &Config, cache: ContentCache, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
    let endpoints = Endpoints::new(&config.api)?;

    let origin = Url::parse(&config.app.origin)
      .map_err(|e| eyre!("Invalid app origin {}: {}", config.app.origin, e))?;
    let shell = config
      .app
      .shell
      .iter()
      .map(|path| {
        origin
          .join(path)
          .map_err(|e| eyre!("Invalid shell path {}: {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      layer: CacheLayer::new(cache),
      endpoints,
      fetcher,
      shell,
    })
  }

  pub fn cache(&self) -> &ContentCache {
    self.layer.cache()
  }

  pub fn endpoints(&self) -> &Endpoints {
    &self.endpoints
  }

  /// Pre-cache the application shell so the app boots offline.
  ///
  /// All shell resources are fetched before any is stored; one failure
  /// aborts the install and leaves the document partition untouched.
  pub async fn install(&self) -> Result<usize> {
    let mut fetched = Vec::with_capacity(self.shell.len());
    for url in &self.shell {
      let request = ContentRequest::get(url.clone()).with_destination(Destination::Document);
      let response = self
        .fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Install failed fetching {}: {}", url, e))?;
      if !response.is_ok() {
        return Err(eyre!(
          "Install failed: {} returned status {}",
          url,
          response.status
        ));
      }
      fetched.push((request.key(), response));
    }

    for (key, response) in &fetched {
      self.cache().put(Partition::Document, key, response);
    }

    info!(resources = fetched.len(), "application shell cached");
    Ok(fetched.len())
  }

  /// Drop partitions left behind by earlier cache versions.
  pub fn activate(&self) -> usize {
    let current = self.cache().names().current();
    let removed = self.cache().purge_stale(&current);
    info!(removed, ?current, "stale cache partitions purged");
    removed
  }

  /// Serve an intercepted content request.
  pub async fn handle_fetch(&self, request: &ContentRequest) -> Result<CacheResult<Response>> {
    let route = classify(request, &self.endpoints);
    debug!(url = %request.url, ?route, "routing request");

    let key = request.key();
    let fetch = || self.fetcher.fetch(request);

    match route {
      Route::NetworkFirst(partition) => self.layer.network_first(partition, &key, fetch).await,
      Route::CacheFirst(partition) => Ok(self.layer.cache_first(partition, &key, fetch).await),
      Route::Passthrough => fetch().await.map(CacheResult::passthrough),
    }
  }

  /// Apply a seed/evict message.
  ///
  /// Recipes with an image spawn their image fetch with `tokio::spawn`, so
  /// this must run inside a Tokio runtime. Outside the crate, messages go
  /// through [`GatewayHandle::send`].
  pub(crate) fn handle_message(&self, message: GatewayMessage) -> ImageTasks {
    match message {
      GatewayMessage::CacheRecipe { recipe } => self.cache_recipe(&recipe).into_iter().collect(),
      GatewayMessage::CacheRecipes { recipes } => recipes
        .iter()
        .filter_map(|recipe| self.cache_recipe(recipe))
        .collect(),
      GatewayMessage::RemoveCachedRecipe { recipe_id } => {
        self.remove_cached_recipe(&recipe_id);
        Vec::new()
      }
    }
  }

  /// Store a synthesized lookup response for `meal` and kick off a detached
  /// fetch of its image.
  fn cache_recipe(&self, meal: &Meal) -> Option<JoinHandle<()>> {
    let key = match self.endpoints.lookup_key(&meal.id) {
      Ok(key) => key,
      Err(e) => {
        warn!(meal_id = %meal.id, error = %e, "cannot derive lookup key");
        return None;
      }
    };

    match serde_json::to_vec(&LookupResponse::for_meal(meal)) {
      Ok(body) => self.cache().put(Partition::Recipe, &key, &Response::json(body)),
      Err(e) => warn!(meal_id = %meal.id, error = %e, "failed to encode recipe"),
    }

    let image = meal.image()?;
    let request = match ContentRequest::parse(image) {
      Ok(request) => request.with_destination(Destination::Image),
      Err(e) => {
        warn!(meal_id = %meal.id, error = %e, "skipping image caching");
        return None;
      }
    };

    let cache = self.cache().clone();
    let fetcher = Arc::clone(&self.fetcher);
    Some(tokio::spawn(async move {
      cache_image(cache, fetcher, request).await;
    }))
  }

  fn remove_cached_recipe(&self, meal_id: &str) -> bool {
    match self.endpoints.lookup_key(meal_id) {
      Ok(key) => {
        let removed = self.cache().delete(Partition::Recipe, &key);
        debug!(meal_id, removed, "cached recipe removed");
        removed
      }
      Err(e) => {
        warn!(meal_id, error = %e, "cannot derive lookup key");
        false
      }
    }
  }

  /// Move the gateway onto its own task.
  ///
  /// The task stops when every handle has been dropped or
  /// [`GatewayHandle::shutdown`] is called.
  pub fn spawn(self) -> (GatewayHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
      while let Some(command) = rx.recv().await {
        match command {
          GatewayCommand::Message(message) => {
            // Image tasks run detached
            let _ = self.handle_message(message);
          }
          GatewayCommand::Fetch(request, reply) => {
            let gateway = self.clone();
            tokio::spawn(async move {
              let _ = reply.send(gateway.handle_fetch(&request).await);
            });
          }
          GatewayCommand::Shutdown => break,
        }
      }
      debug!("gateway stopped");
    });

    (GatewayHandle { tx }, task)
  }
}

/// Best-effort image caching; failures are logged and dropped.
async fn cache_image(cache: ContentCache, fetcher: Arc<dyn Fetcher>, request: ContentRequest) {
  let key: RequestKey = request.key();
  if cache.get(Partition::Image, &key).is_some() {
    return;
  }

  match fetcher.fetch(&request).await {
    Ok(response) if response.is_ok() => cache.put(Partition::Image, &key, &response),
    Ok(response) => {
      warn!(url = %request.url, status = response.status, "image not cached")
    }
    Err(e) => warn!(url = %request.url, error = %e, "image fetch failed"),
  }
}

enum GatewayCommand {
  Message(GatewayMessage),
  Fetch(ContentRequest, oneshot::Sender<Result<CacheResult<Response>>>),
  Shutdown,
}

/// Cloneable sender side of a running gateway.
#[derive(Clone)]
pub struct GatewayHandle {
  tx: mpsc::UnboundedSender<GatewayCommand>,
}

impl GatewayHandle {
  /// Fire-and-forget; returns false if the gateway has stopped.
  pub fn send(&self, message: GatewayMessage) -> bool {
    let sent = self.tx.send(GatewayCommand::Message(message)).is_ok();
    if !sent {
      debug!("gateway stopped, message dropped");
    }
    sent
  }

  pub fn cache_recipe(&self, meal: &Meal) -> bool {
    self.send(GatewayMessage::CacheRecipe {
      recipe: meal.clone(),
    })
  }

  /// Route a content request through the gateway and wait for the result.
  pub async fn fetch(&self, request: ContentRequest) -> Result<CacheResult<Response>> {
    let (reply_tx, reply_rx) = oneshot::channel();
    self
      .tx
      .send(GatewayCommand::Fetch(request, reply_tx))
      .map_err(|_| eyre!("Gateway is not running"))?;
    reply_rx
      .await
      .map_err(|_| eyre!("Gateway dropped the request"))?
  }

  pub fn shutdown(&self) {
    let _ = self.tx.send(GatewayCommand::Shutdown);
  }
}
