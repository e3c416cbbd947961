//! Request correlator
//!
//! Request/reply on top of plain publish/subscribe. For each request the
//! correlator:
//! - picks a reply subject `<inbox prefix>.<token>` that is not in use
//! - subscribes to it with a one-shot handler that fills the request's
//!   result slot
//! - hands back a [`Ticket`] the caller publishes with and then waits on
//!
//! The result slot accepts one write. Whoever takes the sender first (the
//! reply handler, the deadline, or `cancel_all`) decides the outcome and
//! every later attempt is a no-op, so a reply racing the deadline produces
//! exactly one result. A `Ticket` cleans up its pending entry and reply
//! subscription when dropped, which also covers callers that abandon the
//! request future.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::inbox::TokenGenerator;
use crate::dispatch::handler::{HandlerResult, MessageHandler};
use crate::registry::SubjectRegistry;
use crate::subject::{Message, Subject};
use crate::subscription::Subscription;
use crate::utils::error::{Error, Result};

const MAX_TOKEN_ATTEMPTS: usize = 8;

/// Upper bound on a request timeout, about 30 years. Longer timeouts,
/// `Duration::MAX` included, mean "no deadline" and are clamped to this.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(FAR_FUTURE)
}

/// Single-assignment result slot.
struct ReplySlot {
    sender: Mutex<Option<oneshot::Sender<Message>>>,
}

impl ReplySlot {
    fn new(sender: oneshot::Sender<Message>) -> Self {
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Returns false if the slot was already filled or closed.
    fn fulfill(&self, msg: Message) -> bool {
        match self.sender.lock().take() {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    fn close(&self) {
        self.sender.lock().take();
    }
}

struct ReplyHandler {
    slot: Arc<ReplySlot>,
}

#[async_trait]
impl MessageHandler for ReplyHandler {
    async fn handle(&self, msg: Message) -> HandlerResult {
        let subject = msg.subject().clone();
        if !self.slot.fulfill(msg) {
            debug!(reply = %subject, "dropping reply for settled request");
        }
        Ok(())
    }
}

struct PendingRequest {
    slot: Arc<ReplySlot>,
    deadline: Instant,
    subscription: Subscription,
}

pub struct RequestCorrelator {
    inbox_prefix: String,
    tokens: Arc<dyn TokenGenerator>,
    pending: Mutex<HashMap<Subject, PendingRequest>>,
    settled: Notify,
}

impl RequestCorrelator {
    pub fn new(inbox_prefix: impl Into<String>, tokens: Arc<dyn TokenGenerator>) -> Self {
        Self {
            inbox_prefix: inbox_prefix.into(),
            tokens,
            pending: Mutex::new(HashMap::new()),
            settled: Notify::new(),
        }
    }

    /// A fresh inbox subject. Uniqueness is only checked by [`begin`].
    ///
    /// [`begin`]: RequestCorrelator::begin
    pub fn new_inbox(&self) -> Result<Subject> {
        Subject::concrete(&format!(
            "{}.{}",
            self.inbox_prefix,
            self.tokens.next_token()
        ))
    }

    /// Requests still waiting for a reply or their deadline.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Earliest deadline among pending requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.lock().values().map(|p| p.deadline).min()
    }

    /// Register a pending request expiring `timeout` from now.
    pub fn begin(
        self: &Arc<Self>,
        registry: &Arc<SubjectRegistry>,
        timeout: Duration,
    ) -> Result<Ticket> {
        let deadline = deadline_after(timeout);
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(ReplySlot::new(tx));

        let mut pending = self.pending.lock();
        let reply = self.unique_inbox(registry, &pending)?;
        let subscription = registry.register(
            reply.as_str(),
            None,
            Arc::new(ReplyHandler {
                slot: Arc::clone(&slot),
            }),
        )?;
        subscription.unsubscribe_after(1);
        pending.insert(
            reply.clone(),
            PendingRequest {
                slot,
                deadline,
                subscription,
            },
        );
        drop(pending);

        trace!(reply = %reply, ?timeout, "request pending");
        Ok(Ticket {
            correlator: Arc::clone(self),
            reply,
            deadline,
            receiver: rx,
        })
    }

    fn unique_inbox(
        &self,
        registry: &SubjectRegistry,
        pending: &HashMap<Subject, PendingRequest>,
    ) -> Result<Subject> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let candidate = self.new_inbox()?;
            if !pending.contains_key(&candidate) && !registry.contains_pattern(candidate.as_str()) {
                return Ok(candidate);
            }
            debug!(reply = %candidate, "reply subject already in use, drawing another");
        }
        Err(Error::ReplySubjectExhausted(MAX_TOKEN_ATTEMPTS))
    }

    fn close_slot(&self, reply: &Subject) {
        if let Some(request) = self.pending.lock().get(reply) {
            request.slot.close();
        }
    }

    /// Forget a request and drop its reply subscription.
    fn settle(&self, reply: &Subject) {
        let (removed, idle) = {
            let mut pending = self.pending.lock();
            (pending.remove(reply), pending.is_empty())
        };
        if let Some(request) = removed {
            request.slot.close();
            request.subscription.unsubscribe();
        }
        if idle {
            self.settled.notify_waiters();
        }
    }

    /// Fail every pending request with `ConnectionClosed`.
    pub fn cancel_all(&self) {
        let drained: Vec<PendingRequest> = self.pending.lock().drain().map(|(_, p)| p).collect();
        for request in drained {
            request.slot.close();
            request.subscription.unsubscribe();
        }
        self.settled.notify_waiters();
    }

    /// Resolves once no request is pending.
    pub async fn settled(&self) {
        loop {
            let notified = self.settled.notified();
            let idle = self.pending.lock().is_empty();
            if idle {
                return;
            }
            notified.await;
        }
    }
}

/// One in-flight request: the reply subject to publish with and the
/// receiving end of its result slot.
pub struct Ticket {
    correlator: Arc<RequestCorrelator>,
    reply: Subject,
    deadline: Instant,
    receiver: oneshot::Receiver<Message>,
}

impl Ticket {
    /// Unique inbox the reply is expected on.
    pub fn reply_subject(&self) -> &Subject {
        &self.reply
    }

    /// When [`wait`](Self::wait) gives up with `Timeout`.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the reply or the deadline, whichever comes first.
    pub async fn wait(mut self) -> Result<Message> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(msg)) => Ok(msg),
            // Slot closed without a reply: the connection shut down.
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => self.expire(),
        }
    }

    fn expire(&mut self) -> Result<Message> {
        // Close first: a reply that got in before this point is kept, any
        // later one is refused by the slot.
        self.correlator.close_slot(&self.reply);
        match self.receiver.try_recv() {
            Ok(msg) => Ok(msg),
            Err(_) => {
                debug!(reply = %self.reply, "request timed out");
                Err(Error::Timeout)
            }
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.correlator.settle(&self.reply);
    }
}
