//! Network plumbing: the content transport and connectivity tracking.

mod fetch;
mod monitor;

pub use fetch::{BoxFuture, ContentRequest, Destination, Fetcher, HttpFetcher};
pub use monitor::{ConnectivityState, NetworkMonitor, SubscriptionId};
