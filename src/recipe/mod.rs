//! Recipe API shapes and URL conventions consumed by the offline layer.

mod endpoints;
mod types;

pub use endpoints::Endpoints;
pub use types::{LookupResponse, Meal};
