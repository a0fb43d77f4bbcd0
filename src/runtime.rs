//! Wiring of the offline layer: storage, gateway, monitor, queue and
//! coordinator, started and stopped together.

use color_eyre::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{CacheStorage, ContentCache, NoopStorage, PartitionNames, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::gateway::{CacheGateway, GatewayHandle};
use crate::net::{Fetcher, HttpFetcher, NetworkMonitor};
use crate::offline::OfflineActions;
use crate::sync::{AppStateMutator, MutationQueue, SyncCoordinator, SyncDriver};

/// A running offline layer.
pub struct OfflineRuntime {
  gateway: GatewayHandle,
  gateway_task: JoinHandle<()>,
  monitor: NetworkMonitor,
  queue: Arc<MutationQueue>,
  coordinator: Arc<SyncCoordinator>,
  driver: SyncDriver,
  actions: OfflineActions,
}

impl OfflineRuntime {
  /// Start with the HTTP transport.
  pub async fn start(config: &Config, app_state: Arc<dyn AppStateMutator>) -> Result<Self> {
    let fetcher = Arc::new(HttpFetcher::new(config.network.timeout())?);
    Self::start_with_fetcher(config, app_state, fetcher).await
  }

  /// Start with a caller-supplied transport.
  ///
  /// Runs the install and activate steps before the gateway starts taking
  /// requests. A failed install (typically: started offline) is logged and
  /// the previously cached shell keeps serving.
  pub async fn start_with_fetcher(
    config: &Config,
    app_state: Arc<dyn AppStateMutator>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Result<Self> {
    let data_dir = config.data_dir()?;

    let storage: Arc<dyn CacheStorage> = if config.caching_enabled {
      Arc::new(SqliteStorage::from_connection(
        Database::open(&data_dir)?.into_conn(),
      )?)
    } else {
      Arc::new(NoopStorage)
    };
    let cache = ContentCache::new(storage, PartitionNames::new(config.cache_version.as_str()));

    let gateway = CacheGateway::new(config, cache, fetcher)?;
    if let Err(e) = gateway.install().await {
      warn!(error = %e, "install failed, keeping previously cached shell");
    }
    gateway.activate();
    let (gateway, gateway_task) = gateway.spawn();

    let queue = Arc::new(MutationQueue::from_connection(
      Database::open(&data_dir)?.into_conn(),
    )?);
    let monitor = NetworkMonitor::new();
    let coordinator = Arc::new(SyncCoordinator::new(
      Arc::clone(&queue),
      Arc::clone(&app_state),
    ));
    let driver = coordinator.attach(&monitor);

    // Entries left by a previous session; we start out assuming online
    let pending = queue.len()?;
    if pending > 0 {
      info!(pending, "replaying mutations from previous session");
      driver.trigger().request_drain();
    }

    let actions =
      OfflineActions::new(app_state, monitor.clone(), Arc::clone(&queue), gateway.clone())
        .with_drain_trigger(driver.trigger());

    info!(version = %config.cache_version, data_dir = %data_dir.display(), "offline layer started");

    Ok(Self {
      gateway,
      gateway_task,
      monitor,
      queue,
      coordinator,
      driver,
      actions,
    })
  }

  pub fn actions(&self) -> &OfflineActions {
    &self.actions
  }

  /// Feed environment online/offline events here.
  pub fn monitor(&self) -> &NetworkMonitor {
    &self.monitor
  }

  pub fn gateway(&self) -> &GatewayHandle {
    &self.gateway
  }

  pub fn queue(&self) -> &Arc<MutationQueue> {
    &self.queue
  }

  pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
    &self.coordinator
  }

  /// Unsubscribe every listener and stop the background tasks.
  pub async fn shutdown(self) {
    self.driver.stop();
    self.monitor.shutdown();
    self.gateway.shutdown();
    let _ = self.gateway_task.await;
    info!("offline layer stopped");
  }
}
