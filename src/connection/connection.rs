//! Connection façade
//!
//! `Connection` is the public entry point. It wires the registry, the
//! dispatcher and the request correlator to a transport and owns the
//! connection lifecycle:
//!
//! ```text
//! Disconnected --connect()--> Connected --drain()--> Draining --> Closed
//!                                  \------------close()-----------^
//! ```
//!
//! Transitions only move forward. `publish`, `subscribe` and `request` are
//! refused once the connection is draining or closed; inbound delivery keeps
//! running while draining so requests already in flight can still get their
//! reply.
//!
//! A `Connection` is a cheap handle: clone it into handlers that need to
//! reply. Call `drain` or `close` when done; handlers holding a clone keep
//! the connection's tasks alive otherwise.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::options::ConnectOptions;
use super::stats::{Statistics, StatsSnapshot};
use crate::dispatch::Dispatcher;
use crate::dispatch::handler::{ErrorReporter, MessageHandler};
use crate::registry::SubjectRegistry;
use crate::request::RequestCorrelator;
use crate::subject::{Message, Subject};
use crate::subscription::Subscription;
use crate::transport::Transport;
use crate::utils::error::{Error, HandlerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Draining,
    Closed,
}

/// Counts handler faults before passing them on.
struct CountingReporter {
    stats: Arc<Statistics>,
    inner: Arc<dyn ErrorReporter>,
}

impl ErrorReporter for CountingReporter {
    fn report(&self, error: &HandlerError) {
        self.stats.record_handler_error();
        self.inner.report(error);
    }
}

struct ConnectionInner {
    options: ConnectOptions,
    state: watch::Sender<ConnectionState>,
    registry: Arc<SubjectRegistry>,
    dispatcher: Arc<Dispatcher>,
    correlator: Arc<RequestCorrelator>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    stats: Arc<Statistics>,
}

impl ConnectionInner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move forward to `next`. Returns false if already there or beyond.
    fn advance(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => Err(Error::NotConnected),
            ConnectionState::Draining | ConnectionState::Closed => Err(Error::ConnectionClosed),
        }
    }

    fn send(&self, msg: Message) -> Result<()> {
        let transport = self.transport.read().clone();
        let Some(transport) = transport else {
            return Err(match self.state() {
                ConnectionState::Disconnected => Error::NotConnected,
                _ => Error::ConnectionClosed,
            });
        };
        let size = msg.size();
        transport.send(msg)?;
        self.stats.record_out(size);
        Ok(())
    }

    fn shutdown(&self) {
        self.correlator.cancel_all();
        self.registry.stop_all();
        if let Some(transport) = self.transport.write().take() {
            transport.close();
        }
        self.advance(ConnectionState::Closed);
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// Build a connection from `options` and connect it.
pub async fn connect(options: ConnectOptions) -> Result<Connection> {
    let connection = Connection::new(options);
    connection.connect().await?;
    Ok(connection)
}

impl Connection {
    /// A `Disconnected` connection. Nothing is opened until [`connect`].
    ///
    /// [`connect`]: Connection::connect
    pub fn new(options: ConnectOptions) -> Self {
        let stats = Arc::new(Statistics::default());
        let reporter = Arc::new(CountingReporter {
            stats: Arc::clone(&stats),
            inner: Arc::clone(&options.error_reporter),
        });
        let registry = Arc::new(SubjectRegistry::new(reporter));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&options.queue_selector),
            Arc::clone(&stats),
        ));
        let correlator = Arc::new(RequestCorrelator::new(
            options.inbox_prefix.clone(),
            Arc::clone(&options.token_generator),
        ));
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(ConnectionInner {
                options,
                state,
                registry,
                dispatcher,
                correlator,
                transport: RwLock::new(None),
                stats,
            }),
        }
    }

    /// Try each configured server in order; the first that accepts wins.
    ///
    /// Connecting an already connected connection is a no-op.
    pub async fn connect(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Draining | ConnectionState::Closed => {
                return Err(Error::ConnectionClosed);
            }
            ConnectionState::Disconnected => {}
        }

        let options = &self.inner.options;
        for server in &options.servers {
            let transport = match options
                .connector
                .open(server, Arc::clone(&self.inner.dispatcher))
                .await
            {
                Ok(transport) => transport,
                Err(e) => {
                    warn!(server = %server, error = %e, "server unavailable");
                    continue;
                }
            };

            let mut slot = self.inner.transport.write();
            match self.state() {
                ConnectionState::Disconnected => {
                    *slot = Some(transport);
                    self.inner.advance(ConnectionState::Connected);
                    drop(slot);
                    info!(
                        server = %server,
                        name = options.name.as_deref().unwrap_or(""),
                        "connected"
                    );
                    return Ok(());
                }
                // Lost a race with another connect or with close.
                state => {
                    drop(slot);
                    transport.close();
                    return match state {
                        ConnectionState::Connected => Ok(()),
                        _ => Err(Error::ConnectionClosed),
                    };
                }
            }
        }
        Err(Error::NoServers)
    }

    /// Current lifecycle state. Only ever moves forward.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.options.name.as_deref()
    }

    /// Message and byte counters since connect.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of registered subscriptions, internal reply subscriptions
    /// included.
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending()
    }

    /// A fresh inbox subject under the configured prefix.
    pub fn new_inbox(&self) -> Result<Subject> {
        self.inner.correlator.new_inbox()
    }

    /// Fire-and-forget publish. Returns once the message is handed to the
    /// transport, independent of any handler.
    pub fn publish(&self, subject: &str, payload: impl Into<Bytes>) -> Result<()> {
        self.inner.ensure_open()?;
        let subject = Subject::concrete(subject)?;
        self.inner.send(Message::new(subject, payload))
    }

    /// Publish with a reply address set, leaving the caller to subscribe
    /// to `reply_to` itself. See [`request`](Self::request) for the
    /// managed variant.
    pub fn publish_with_reply(
        &self,
        subject: &str,
        reply_to: &str,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        self.inner.ensure_open()?;
        let subject = Subject::concrete(subject)?;
        let reply_to = Subject::concrete(reply_to)?;
        self.inner
            .send(Message::with_reply(subject, reply_to, payload))
    }

    /// Publish `payload` to the reply subject of `msg`.
    pub fn respond(&self, msg: &Message, payload: impl Into<Bytes>) -> Result<()> {
        let reply_to = msg.reply_to().ok_or(Error::NoReplySubject)?;
        self.inner.ensure_open()?;
        self.inner.send(Message::new(reply_to.clone(), payload))
    }

    /// Register `handler` for every subject matching `pattern`. Messages
    /// reach the handler one at a time, in arrival order.
    pub fn subscribe<H: MessageHandler>(&self, pattern: &str, handler: H) -> Result<Subscription> {
        self.inner.ensure_open()?;
        self.inner
            .registry
            .register(pattern, None, Arc::new(handler))
    }

    /// Subscribe as a member of `queue_group`: each message matching
    /// `pattern` reaches one member of the group.
    pub fn queue_subscribe<H: MessageHandler>(
        &self,
        pattern: &str,
        queue_group: &str,
        handler: H,
    ) -> Result<Subscription> {
        self.inner.ensure_open()?;
        self.inner
            .registry
            .register(pattern, Some(queue_group), Arc::new(handler))
    }

    /// Publish to `subject` with a unique reply subject and wait up to
    /// `timeout` for the first reply.
    pub async fn request(
        &self,
        subject: &str,
        payload: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Message> {
        self.inner.ensure_open()?;
        let subject = Subject::concrete(subject)?;
        let payload = payload.into();

        let ticket = self
            .inner
            .correlator
            .begin(&self.inner.registry, timeout)?;
        self.inner.send(Message::with_reply(
            subject,
            ticket.reply_subject().clone(),
            payload,
        ))?;
        ticket.wait().await
    }

    /// Graceful shutdown: refuse new work, let pending requests resolve or
    /// expire, run every queued message, then close. Bounded by the
    /// configured drain timeout; whatever is left then is dropped.
    ///
    /// A second call waits for the first to finish.
    pub async fn drain(&self) {
        if !self.inner.advance(ConnectionState::Draining) {
            self.closed().await;
            return;
        }
        info!(
            pending_requests = self.inner.correlator.pending(),
            subscriptions = self.inner.registry.len(),
            "draining connection"
        );

        let inner = Arc::clone(&self.inner);
        let work = async move {
            inner.correlator.settled().await;
            let subscribers = inner.registry.snapshot();
            futures::future::join_all(
                subscribers
                    .iter()
                    .map(|subscriber| inner.registry.drain_subscriber(subscriber)),
            )
            .await;
        };
        if tokio::time::timeout(self.inner.options.drain_timeout, work)
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.inner.options.drain_timeout,
                "drain timed out, dropping remaining work"
            );
        }

        self.inner.shutdown();
        info!("connection closed");
    }

    /// Close immediately. Pending requests fail with `ConnectionClosed` and
    /// queued messages are discarded.
    pub fn close(&self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.inner.shutdown();
        debug!("connection closed without draining");
    }

    /// Resolves once the connection is `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }
}
