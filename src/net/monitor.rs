//! Process-wide connectivity state with synchronous transition listeners.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Snapshot of connectivity.
///
/// `version` increments on every actual online/offline change, so comparing
/// two snapshots detects a flip that happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
  pub online: bool,
  pub version: u64,
}

/// Handle returned by [`NetworkMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
  state: ConnectivityState,
  listeners: Vec<(SubscriptionId, Listener)>,
  next_id: u64,
}

/// Tracks online/offline transitions reported by the environment.
///
/// Starts online until the first event says otherwise. Every reported event
/// is forwarded to listeners, duplicates included; there is no debouncing.
/// Listeners run synchronously on the reporting thread and must not block.
#[derive(Clone)]
pub struct NetworkMonitor {
  inner: Arc<Mutex<Inner>>,
}

impl Default for NetworkMonitor {
  fn default() -> Self {
    Self::new()
  }
}

impl NetworkMonitor {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        state: ConnectivityState {
          online: true,
          version: 0,
        },
        listeners: Vec::new(),
        next_id: 0,
      })),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    // Listeners never run under the lock, so a poisoned guard still holds
    // consistent state.
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn is_online(&self) -> bool {
    self.lock().state.online
  }

  pub fn state(&self) -> ConnectivityState {
    self.lock().state
  }

  /// Report an environment "online"/"offline" event.
  pub fn set_online(&self, online: bool) {
    let listeners: Vec<Listener> = {
      let mut inner = self.lock();
      if inner.state.online != online {
        inner.state.online = online;
        inner.state.version += 1;
        info!(online, version = inner.state.version, "connectivity changed");
      }
      inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
    };

    for listener in listeners {
      listener(online);
    }
  }

  pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
  where
    F: Fn(bool) + Send + Sync + 'static,
  {
    let mut inner = self.lock();
    let id = SubscriptionId(inner.next_id);
    inner.next_id += 1;
    inner.listeners.push((id, Arc::new(listener)));
    id
  }

  /// Remove a listener; false if it was not registered.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut inner = self.lock();
    let before = inner.listeners.len();
    inner.listeners.retain(|(existing, _)| *existing != id);
    inner.listeners.len() != before
  }

  pub fn listener_count(&self) -> usize {
    self.lock().listeners.len()
  }

  /// Drop every listener.
  pub fn shutdown(&self) {
    self.lock().listeners.clear();
  }
}
