//! The `transport` module is the seam between the messaging core and
//! whatever carries messages to and from a broker.
//!
//! A [`Connector`] opens a link to one server and returns a [`Transport`]
//! for outbound traffic; inbound traffic is pushed into the connection's
//! [`Dispatcher`]. Wire framing, authentication and reconnects all belong to
//! implementations of these traits, not to the core.
//!
//! [`local::LocalBroker`] is an in-process implementation that routes
//! messages between connections of the same process.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::Dispatcher;
use crate::subject::Message;
use crate::utils::error::TransportError;

pub mod local;

pub use local::LocalBroker;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a link to `server`. Inbound messages must be handed to
    /// `inbound.deliver`.
    async fn open(
        &self,
        server: &str,
        inbound: Arc<Dispatcher>,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}

pub trait Transport: Send + Sync + 'static {
    /// Queue `msg` for the broker. Must not wait for delivery.
    fn send(&self, msg: Message) -> Result<(), TransportError>;

    /// Detach from the broker. Idempotent.
    fn close(&self);
}
