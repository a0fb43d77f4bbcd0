//! UI-facing offline actions.
//!
//! Every action follows the same template:
//! 1. ask the gateway to cache the referenced recipe (fire-and-forget)
//! 2. apply the mutation to app state immediately
//! 3. if offline, record it in the mutation queue for replay
//!
//! None of these steps waits on the network, and no action ever reports an
//! error to the caller; failures are logged.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::gateway::GatewayHandle;
use crate::net::{ConnectivityState, NetworkMonitor};
use crate::recipe::Meal;
use crate::sync::{AppStateMutator, DrainTrigger, Mutation, MutationQueue};

/// What an action did beyond the optimistic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionOutcome {
  /// Sequence number if the mutation was queued for replay
  pub queued: Option<u64>,
}

/// Offline-aware wrapper around the app's local-state mutators.
#[derive(Clone)]
pub struct OfflineActions {
  app_state: Arc<dyn AppStateMutator>,
  monitor: NetworkMonitor,
  queue: Arc<MutationQueue>,
  gateway: GatewayHandle,
  drain: Option<DrainTrigger>,
}

impl OfflineActions {
  pub fn new(
    app_state: Arc<dyn AppStateMutator>,
    monitor: NetworkMonitor,
    queue: Arc<MutationQueue>,
    gateway: GatewayHandle,
  ) -> Self {
    Self {
      app_state,
      monitor,
      queue,
      gateway,
      drain: None,
    }
  }

  /// Request a drain when an enqueue races a reconnect.
  pub fn with_drain_trigger(mut self, trigger: DrainTrigger) -> Self {
    self.drain = Some(trigger);
    self
  }

  pub fn add_favorite(&self, meal: &Meal) -> ActionOutcome {
    self.perform(Mutation::AddFavorite { meal: meal.clone() })
  }

  pub fn remove_favorite(&self, meal_id: &str) -> ActionOutcome {
    self.perform(Mutation::RemoveFavorite {
      meal_id: meal_id.to_string(),
    })
  }

  pub fn mark_as_cooked(&self, meal: &Meal) -> ActionOutcome {
    self.perform(Mutation::MarkCooked { meal: meal.clone() })
  }

  pub fn add_to_meal_plan(&self, day: &str, meal: &Meal) -> ActionOutcome {
    self.perform(Mutation::AddToPlan {
      day: day.to_string(),
      meal: meal.clone(),
    })
  }

  pub fn remove_from_meal_plan(&self, day: &str, meal_id: &str) -> ActionOutcome {
    self.perform(Mutation::RemoveFromPlan {
      day: day.to_string(),
      meal_id: meal_id.to_string(),
    })
  }

  fn perform(&self, mutation: Mutation) -> ActionOutcome {
    if let Some(meal) = mutation.meal() {
      self.gateway.cache_recipe(meal);
    }

    if let Err(e) = mutation.apply(self.app_state.as_ref()) {
      warn!(
        kind = %mutation.kind(),
        meal_id = mutation.meal_id(),
        error = %e,
        "optimistic update failed"
      );
    }

    let before = self.monitor.state();
    if before.online {
      return ActionOutcome::default();
    }
    self.enqueue(&mutation, before)
  }

  /// Queue `mutation`, observed offline at `before`.
  fn enqueue(&self, mutation: &Mutation, before: ConnectivityState) -> ActionOutcome {
    let sequence = match self.queue.enqueue(mutation) {
      Ok(sequence) => sequence,
      Err(e) => {
        error!(
          kind = %mutation.kind(),
          meal_id = mutation.meal_id(),
          error = %e,
          "failed to queue mutation"
        );
        return ActionOutcome::default();
      }
    };
    debug!(sequence, kind = %mutation.kind(), "mutation queued for replay");

    if reconnect_raced(before, self.monitor.state()) {
      debug!(sequence, "reconnected while queueing, requesting drain");
      if let Some(trigger) = &self.drain {
        trigger.request_drain();
      }
    }

    ActionOutcome {
      queued: Some(sequence),
    }
  }
}

/// Whether the reconnect drain may have run before a queued entry landed.
fn reconnect_raced(before: ConnectivityState, after: ConnectivityState) -> bool {
  after.online && after.version != before.version
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, ContentCache, PartitionNames, SqliteStorage};
  use crate::config::Config;
  use crate::gateway::tests::FakeFetcher;
  use crate::gateway::CacheGateway;
  use crate::net::ContentRequest;
  use crate::sync::{MutationKind, RecordingState};

  struct Harness {
    actions: OfflineActions,
    state: Arc<RecordingState>,
    queue: Arc<MutationQueue>,
    monitor: NetworkMonitor,
    gateway: GatewayHandle,
  }

  fn harness() -> Harness {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let cache = ContentCache::new(storage, PartitionNames::new("v1"));
    let gateway = CacheGateway::new(&Config::default(), cache, Arc::new(FakeFetcher::default()))
      .unwrap();
    let (gateway, _task) = gateway.spawn();

    let state = Arc::new(RecordingState::default());
    let queue = Arc::new(MutationQueue::open_in_memory().unwrap());
    let monitor = NetworkMonitor::new();
    let actions =
      OfflineActions::new(state.clone(), monitor.clone(), queue.clone(), gateway.clone());

    Harness {
      actions,
      state,
      queue,
      monitor,
      gateway,
    }
  }

  #[tokio::test]
  async fn test_online_action_applies_without_queueing() {
    let h = harness();
    let outcome = h.actions.add_favorite(&Meal::new("52772"));

    assert_eq!(outcome.queued, None);
    assert!(h.state.is_favorite("52772"));
    assert!(h.queue.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_offline_action_applies_and_queues() {
    let h = harness();
    h.monitor.set_online(false);

    let outcome = h.actions.add_favorite(&Meal::new("52772"));

    assert_eq!(outcome.queued, Some(1));
    assert!(h.state.is_favorite("52772"));
    let entries = h.queue.list().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind(), MutationKind::AddFavorite);
    assert_eq!(entries[0].mutation.meal_id(), "52772");
  }

  #[tokio::test]
  async fn test_each_action_queues_its_kind() {
    let h = harness();
    h.monitor.set_online(false);
    let meal = Meal::new("1");

    h.actions.add_favorite(&meal);
    h.actions.mark_as_cooked(&meal);
    h.actions.add_to_meal_plan("monday", &meal);
    h.actions.remove_from_meal_plan("monday", "1");
    h.actions.remove_favorite("1");

    let kinds: Vec<MutationKind> = h.queue.list().unwrap().iter().map(|m| m.kind()).collect();
    assert_eq!(
      kinds,
      vec![
        MutationKind::AddFavorite,
        MutationKind::MarkCooked,
        MutationKind::AddToPlan,
        MutationKind::RemoveFromPlan,
        MutationKind::RemoveFavorite,
      ]
    );
    assert!(!h.state.is_favorite("1"));
    assert_eq!(*h.state.cooked.lock().unwrap(), vec!["1".to_string()]);
  }

  #[tokio::test]
  async fn test_adding_actions_seed_the_recipe_cache() {
    let h = harness();
    h.monitor.set_online(false);

    h.actions.add_to_meal_plan("sunday", &Meal::new("52772"));

    let lookup =
      ContentRequest::parse("https://www.themealdb.com/api/json/v1/1/lookup.php?i=52772").unwrap();
    let result = h.gateway.fetch(lookup).await.unwrap();
    assert_eq!(result.source, CacheSource::Offline);
  }

  #[tokio::test]
  async fn test_removals_do_not_seed() {
    let h = harness();
    h.actions.remove_favorite("52772");

    let lookup =
      ContentRequest::parse("https://www.themealdb.com/api/json/v1/1/lookup.php?i=52772").unwrap();
    assert!(h.gateway.fetch(lookup).await.is_err());
  }

  #[tokio::test]
  async fn test_failed_optimistic_update_still_queues() {
    let h = harness();
    h.monitor.set_online(false);
    h.state.fail_on("9");

    let outcome = h.actions.mark_as_cooked(&Meal::new("9"));
    assert_eq!(outcome.queued, Some(1));
  }

  fn state(online: bool, version: u64) -> ConnectivityState {
    ConnectivityState { online, version }
  }

  #[test]
  fn test_reconnect_raced() {
    // Still offline, nothing moved
    assert!(!reconnect_raced(state(false, 1), state(false, 1)));
    // Came back online while queueing
    assert!(reconnect_raced(state(false, 1), state(true, 2)));
    // Back online and offline again: the next reconnect will drain
    assert!(!reconnect_raced(state(false, 1), state(false, 3)));
  }

  #[tokio::test]
  async fn test_reconnect_during_enqueue_requests_drain() {
    let h = harness();
    let (trigger, mut drains) = DrainTrigger::channel();
    let actions = h.actions.clone().with_drain_trigger(trigger);

    h.monitor.set_online(false);
    let before = h.monitor.state();
    let mutation = Mutation::AddFavorite {
      meal: Meal::new("52772"),
    };

    // Offline the whole time: queued, no drain
    assert_eq!(actions.enqueue(&mutation, before).queued, Some(1));
    assert!(drains.try_recv().is_err());

    // Reconnect lands between the offline check and the enqueue
    h.monitor.set_online(true);
    assert_eq!(actions.enqueue(&mutation, before).queued, Some(2));
    assert!(drains.try_recv().is_ok());
    assert_eq!(h.queue.len().unwrap(), 2);
  }
}
