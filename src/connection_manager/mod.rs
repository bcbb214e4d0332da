//! Push connection lifecycle and subscriber fan-out.

pub mod backoff;
mod manager;
mod registry;
mod stats;
mod types;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use manager::ConnectionManager;
pub(crate) use registry::panic_message;
pub use registry::{DispatchResult, EventCallback, SubscriberRegistry, Subscription};
pub use stats::ConnectionStats;
pub use types::ConnectionState;
