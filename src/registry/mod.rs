//! The `registry` module indexes active subscriptions by subject pattern
//! and decides how queue groups share traffic.

pub mod queue;
#[allow(clippy::module_inception)]
pub mod registry;

pub use queue::{QueueKey, QueuePolicy, QueueSelector, RandomSelector, RoundRobin};
pub use registry::SubjectRegistry;
