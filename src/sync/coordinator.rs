//! Replays queued mutations against app state once connectivity returns.

use color_eyre::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::mutation::AppStateMutator;
use super::queue::MutationQueue;
use crate::net::{NetworkMonitor, SubscriptionId};

/// Drain state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  /// No drain in progress
  Idle,
  /// Actively replaying the queue
  Draining,
}

/// How a drain cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
  /// The queue is empty
  Completed { replayed: usize },
  /// A mutator failed; the failing entry and everything after it stay queued
  Halted {
    replayed: usize,
    sequence: u64,
    error: String,
  },
  /// Another drain was running, nothing was done
  AlreadyDraining,
}

/// Drains the mutation queue strictly in sequence order.
///
/// At most one drain runs at a time. An entry is removed only after its
/// mutator succeeded; a failure halts the cycle without skipping ahead, so a
/// poison entry blocks later ones until it is removed by hand.
pub struct SyncCoordinator {
  queue: Arc<MutationQueue>,
  app_state: Arc<dyn AppStateMutator>,
  draining: AtomicBool,
}

/// Returns the coordinator to Idle however the drain ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

impl SyncCoordinator {
  pub fn new(queue: Arc<MutationQueue>, app_state: Arc<dyn AppStateMutator>) -> Self {
    Self {
      queue,
      app_state,
      draining: AtomicBool::new(false),
    }
  }

  pub fn state(&self) -> SyncState {
    if self.draining.load(Ordering::Acquire) {
      SyncState::Draining
    } else {
      SyncState::Idle
    }
  }

  pub fn queue(&self) -> &Arc<MutationQueue> {
    &self.queue
  }

  /// Run one drain cycle. Blocks on storage I/O.
  pub fn drain(&self) -> Result<DrainOutcome> {
    if self
      .draining
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      debug!("drain already in progress, ignoring trigger");
      return Ok(DrainOutcome::AlreadyDraining);
    }
    let _guard = DrainGuard(&self.draining);

    let mut replayed = 0;
    while let Some(entry) = self.queue.peek_oldest()? {
      if let Err(e) = entry.mutation.apply(self.app_state.as_ref()) {
        let error = format!("{:#}", e);
        error!(
          sequence = entry.sequence,
          kind = %entry.kind(),
          meal_id = entry.mutation.meal_id(),
          attempts = entry.attempts + 1,
          error = %error,
          "replay failed, halting drain"
        );
        if let Err(e) = self.queue.record_failure(entry.sequence, &error) {
          warn!(sequence = entry.sequence, error = %e, "failed to record replay failure");
        }
        return Ok(DrainOutcome::Halted {
          replayed,
          sequence: entry.sequence,
          error,
        });
      }

      self.queue.remove(entry.sequence)?;
      replayed += 1;
      debug!(sequence = entry.sequence, kind = %entry.kind(), "mutation replayed");
    }

    if replayed > 0 {
      info!(replayed, "mutation queue drained");
    }
    Ok(DrainOutcome::Completed { replayed })
  }

  /// Drain whenever `monitor` reports the network came back.
  ///
  /// Triggers are delivered over a channel to a driver task, which runs each
  /// drain on the blocking pool so the monitor's listeners never block.
  pub fn attach(self: &Arc<Self>, monitor: &NetworkMonitor) -> SyncDriver {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();

    let trigger = DrainTrigger { tx: tx.clone() };
    let subscription = monitor.subscribe(move |online| {
      if online {
        let _ = tx.send(());
      }
    });

    let coordinator = Arc::clone(self);
    let task = tokio::spawn(async move {
      while rx.recv().await.is_some() {
        // Collapse a burst of triggers into one cycle
        while rx.try_recv().is_ok() {}

        let c = Arc::clone(&coordinator);
        match tokio::task::spawn_blocking(move || c.drain()).await {
          Ok(Ok(DrainOutcome::Halted { sequence, .. })) => {
            warn!(sequence, "drain halted, waiting for next reconnect")
          }
          Ok(Ok(_)) => {}
          Ok(Err(e)) => error!(error = %e, "drain aborted by storage failure"),
          Err(e) => error!(error = %e, "drain task panicked"),
        }
      }
      debug!("sync driver stopped");
    });

    SyncDriver {
      monitor: monitor.clone(),
      subscription,
      trigger,
      task,
    }
  }
}

/// Cloneable request for an extra drain cycle.
#[derive(Clone)]
pub struct DrainTrigger {
  tx: mpsc::UnboundedSender<()>,
}

impl DrainTrigger {
  #[cfg(test)]
  pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  /// Returns false if the driver has stopped.
  pub fn request_drain(&self) -> bool {
    self.tx.send(()).is_ok()
  }
}

/// A coordinator attached to a network monitor.
pub struct SyncDriver {
  monitor: NetworkMonitor,
  subscription: SubscriptionId,
  trigger: DrainTrigger,
  task: JoinHandle<()>,
}

impl SyncDriver {
  pub fn trigger(&self) -> DrainTrigger {
    self.trigger.clone()
  }

  /// Unsubscribe from the monitor and stop the driver task.
  pub fn stop(self) {
    self.monitor.unsubscribe(self.subscription);
    self.task.abort();
  }
}
