//! The `subscription` module defines a single registered interest in a
//! subject pattern, its lifecycle, and the task that feeds it messages.

#[allow(clippy::module_inception)]
pub mod subscription;

pub use subscription::{Subscriber, Subscription, SubscriptionId, SubscriptionState};
pub(crate) use subscription::Offer;
