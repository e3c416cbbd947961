//! In-process broker
//!
//! `LocalBroker` stands in for a remote server: it is advertised on a single
//! URL, accepts connections on that URL only, and routes every published
//! message to every attached connection, including the publisher's own (the
//! usual broker default). Handy for tests and demos; it never touches the
//! network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::{Connector, Transport};
use crate::dispatch::Dispatcher;
use crate::subject::Message;
use crate::utils::error::TransportError;

struct Peer {
    id: u64,
    inbound: Arc<Dispatcher>,
}

struct Shared {
    url: String,
    peers: RwLock<Vec<Peer>>,
    next_peer: AtomicU64,
    routed: AtomicU64,
}

#[derive(Clone)]
pub struct LocalBroker {
    shared: Arc<Shared>,
}

impl LocalBroker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                peers: RwLock::new(Vec::new()),
                next_peer: AtomicU64::new(0),
                routed: AtomicU64::new(0),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Number of attached connections.
    pub fn connections(&self) -> usize {
        self.shared.peers.read().len()
    }

    /// Messages routed since creation.
    pub fn routed(&self) -> u64 {
        self.shared.routed.load(Ordering::Relaxed)
    }

    fn route(&self, msg: Message) {
        let peers: Vec<Arc<Dispatcher>> = self
            .shared
            .peers
            .read()
            .iter()
            .map(|p| Arc::clone(&p.inbound))
            .collect();
        self.shared.routed.fetch_add(1, Ordering::Relaxed);

        let subject = msg.subject().clone();
        let accepted: usize = peers.iter().map(|inbound| inbound.deliver(msg.clone())).sum();
        trace!(subject = %subject, peers = peers.len(), accepted, "routed message");
    }

    fn detach(&self, id: u64) {
        self.shared.peers.write().retain(|p| p.id != id);
        debug!(url = %self.shared.url, peer = id, "connection detached");
    }
}

#[async_trait]
impl Connector for LocalBroker {
    async fn open(
        &self,
        server: &str,
        inbound: Arc<Dispatcher>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        if server != self.shared.url {
            return Err(TransportError::Unreachable(server.to_string()));
        }

        let id = self.shared.next_peer.fetch_add(1, Ordering::Relaxed) + 1;
        self.shared.peers.write().push(Peer { id, inbound });
        debug!(url = %self.shared.url, peer = id, "connection attached");

        Ok(Arc::new(LocalLink {
            broker: self.clone(),
            id,
            closed: AtomicBool::new(false),
        }))
    }
}

struct LocalLink {
    broker: LocalBroker,
    id: u64,
    closed: AtomicBool,
}

impl Transport for LocalLink {
    fn send(&self, msg: Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.broker.route(msg);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.detach(self.id);
        }
    }
}
