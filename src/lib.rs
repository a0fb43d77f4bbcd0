//! Offline-first synchronization and caching layer for the recipe browser.
//!
//! - [`gateway`] serves content requests from a partitioned cache
//!   (network-first for documents and recipe JSON, cache-first for images)
//!   and accepts typed seed/evict messages
//! - [`sync`] records mutations made while offline and replays them in
//!   order once the network returns
//! - [`offline`] is the surface the UI calls: apply now, queue if offline
//! - [`runtime`] wires the pieces together

pub mod cache;
pub mod config;
pub mod db;
pub mod gateway;
pub mod net;
pub mod offline;
pub mod recipe;
pub mod runtime;
pub mod sync;
pub mod telemetry;

pub use config::Config;
pub use gateway::{CacheGateway, GatewayHandle, GatewayMessage};
pub use net::NetworkMonitor;
pub use offline::{ActionOutcome, OfflineActions};
pub use recipe::Meal;
pub use runtime::OfflineRuntime;
pub use sync::{AppStateMutator, Mutation, MutationKind, MutationQueue, SyncCoordinator};
