//! Hybrid data-access core for the SÚKL pharmaceutical registry.
//!
//! Queries go to the registry's remote API first, through a rolling rate
//! limiter, a TTL response cache and a retry policy. When the API is
//! unavailable the [`HybridResolver`] answers from the monthly bulk archive,
//! which is loaded once, guarded against decompression bombs and indexed in
//! memory. Every result says where it came from.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod state;

pub use application::resolver::HybridResolver;
pub use domain::error::{ErrorKind, RegistryError};
pub use domain::model::*;
pub use state::AppState;
