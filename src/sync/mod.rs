//! Offline mutation queue and its replay coordinator.

mod coordinator;
mod mutation;
mod queue;

pub use coordinator::{DrainOutcome, DrainTrigger, SyncCoordinator, SyncDriver, SyncState};
pub use mutation::{AppStateMutator, Mutation, MutationKind, QueuedMutation};
pub use queue::{MutationQueue, NAMESPACE};

#[cfg(test)]
pub(crate) use mutation::tests::RecordingState;
