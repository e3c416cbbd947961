//! Subscription lifecycle and sequential delivery
//!
//! Every subscription is backed by a [`Subscriber`]: the record stored in
//! the registry index. A subscriber owns an unbounded FIFO queue and a tokio
//! task that pops messages and runs the handler one at a time, so messages
//! reach a given subscription in the order the dispatcher accepted them while
//! different subscriptions make progress independently.
//!
//! State transitions (never backwards):
//!
//! - `Active`: the queue accepts messages.
//! - `Draining`: the queue is closed; messages already queued still run.
//!   Reached through `drain` or when an auto-unsubscribe limit is hit.
//! - `Unsubscribed`: nothing else runs. An invocation already in flight
//!   finishes, queued messages are discarded.
//!
//! [`Subscription`] is the caller's handle. Dropping it does not
//! unsubscribe.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::dispatch::handler::{ErrorReporter, MessageHandler};
use crate::registry::SubjectRegistry;
use crate::subject::{Message, Subject};
use crate::utils::error::{HandlerError, HandlerErrorKind};

pub type SubscriptionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubscriptionState {
    Active,
    Draining,
    Unsubscribed,
}

/// Outcome of offering a message to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Queued. `exhausted` is set when this message used up the
    /// auto-unsubscribe limit and the subscriber left the index.
    Accepted { exhausted: bool },
    Refused,
}

struct Gate {
    state: SubscriptionState,
    queue: Option<mpsc::UnboundedSender<Message>>,
    delivered: u64,
    max_messages: Option<u64>,
}

impl Gate {
    fn close(&mut self, state: SubscriptionState) {
        if self.state < state {
            self.state = state;
        }
        self.queue = None;
    }
}

/// Registry-side record of one subscription.
pub struct Subscriber {
    id: SubscriptionId,
    pattern: Subject,
    queue_group: Option<Arc<str>>,
    gate: Mutex<Gate>,
    handled: AtomicU64,
    finished: watch::Sender<bool>,
}

impl Subscriber {
    /// Build the subscriber and start its delivery task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(
        id: SubscriptionId,
        pattern: Subject,
        queue_group: Option<Arc<str>>,
        handler: Arc<dyn MessageHandler>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (finished, _) = watch::channel(false);
        let subscriber = Arc::new(Self {
            id,
            pattern,
            queue_group,
            gate: Mutex::new(Gate {
                state: SubscriptionState::Active,
                queue: Some(tx),
                delivered: 0,
                max_messages: None,
            }),
            handled: AtomicU64::new(0),
            finished,
        });
        tokio::spawn(Arc::clone(&subscriber).run(rx, handler, reporter));
        subscriber
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pattern(&self) -> &Subject {
        &self.pattern
    }

    pub fn queue_group(&self) -> Option<&str> {
        self.queue_group.as_deref()
    }

    pub fn state(&self) -> SubscriptionState {
        self.gate.lock().state
    }

    /// Messages accepted into the queue so far.
    pub fn delivered(&self) -> u64 {
        self.gate.lock().delivered
    }

    /// Messages accepted but not yet handled.
    pub fn pending(&self) -> u64 {
        self.delivered()
            .saturating_sub(self.handled.load(Ordering::Acquire))
    }

    pub(crate) fn offer(&self, msg: Message) -> Offer {
        let mut gate = self.gate.lock();
        if gate.state != SubscriptionState::Active {
            return Offer::Refused;
        }
        let Some(queue) = gate.queue.as_ref() else {
            return Offer::Refused;
        };
        if queue.send(msg).is_err() {
            return Offer::Refused;
        }
        gate.delivered += 1;

        let exhausted = gate.max_messages.is_some_and(|max| gate.delivered >= max);
        if exhausted {
            gate.close(SubscriptionState::Draining);
        }
        Offer::Accepted { exhausted }
    }

    /// Move to `Unsubscribed`. Returns false if already there.
    pub(crate) fn stop(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.state == SubscriptionState::Unsubscribed {
            return false;
        }
        gate.close(SubscriptionState::Unsubscribed);
        true
    }

    /// Move from `Active` to `Draining`. Returns false if not active.
    pub(crate) fn begin_drain(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.state != SubscriptionState::Active {
            return false;
        }
        gate.close(SubscriptionState::Draining);
        true
    }

    /// Install an auto-unsubscribe limit. Returns true if the limit is
    /// already reached, in which case the caller must unsubscribe.
    pub(crate) fn limit(&self, max: u64) -> bool {
        let mut gate = self.gate.lock();
        if gate.delivered >= max {
            return true;
        }
        gate.max_messages = Some(max);
        false
    }

    /// Decide under the gate lock whether the next queued message may run.
    /// Once `stop` has released the lock this returns false.
    fn admit(&self) -> bool {
        self.gate.lock().state != SubscriptionState::Unsubscribed
    }

    /// Resolves once the delivery task has exited.
    pub(crate) async fn finished(&self) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    async fn run(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Message>,
        handler: Arc<dyn MessageHandler>,
        reporter: Arc<dyn ErrorReporter>,
    ) {
        while let Some(msg) = rx.recv().await {
            let subject = msg.subject().to_string();

            // Admission and the first poll of the handler happen in the same
            // poll of this future, so nothing can be scheduled in between.
            let invocation = async {
                if !self.admit() {
                    return None;
                }
                trace!(subscription = self.id, subject = %subject, "invoking handler");
                Some(handler.handle(msg).await)
            };
            let kind = match AssertUnwindSafe(invocation).catch_unwind().await {
                Ok(None) => break,
                Ok(Some(Ok(()))) => None,
                Ok(Some(Err(err))) => Some(HandlerErrorKind::Failed(err.to_string())),
                Err(panic) => Some(HandlerErrorKind::Panicked(panic_message(panic.as_ref()))),
            };
            self.handled.fetch_add(1, Ordering::AcqRel);

            if let Some(kind) = kind {
                reporter.report(&HandlerError {
                    subscription: self.id,
                    subject,
                    kind,
                });
            }
        }

        self.gate.lock().close(SubscriptionState::Unsubscribed);
        debug!(subscription = self.id, pattern = %self.pattern, "delivery task finished");
        self.finished.send_replace(true);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("queue_group", &self.queue_group)
            .field("state", &self.state())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Caller-side handle to a registered subscription.
#[derive(Clone)]
pub struct Subscription {
    subscriber: Arc<Subscriber>,
    registry: Arc<SubjectRegistry>,
}

impl Subscription {
    pub(crate) fn new(subscriber: Arc<Subscriber>, registry: Arc<SubjectRegistry>) -> Self {
        Self {
            subscriber,
            registry,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.subscriber.id()
    }

    pub fn pattern(&self) -> &Subject {
        self.subscriber.pattern()
    }

    pub fn queue_group(&self) -> Option<&str> {
        self.subscriber.queue_group()
    }

    pub fn state(&self) -> SubscriptionState {
        self.subscriber.state()
    }

    /// Shorthand for `state() == Active`.
    pub fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    pub fn delivered(&self) -> u64 {
        self.subscriber.delivered()
    }

    /// Queued messages whose handler has not completed yet.
    pub fn pending(&self) -> u64 {
        self.subscriber.pending()
    }

    /// Stop delivery and leave the registry. Idempotent.
    ///
    /// A handler invocation already running is not cancelled, but no further
    /// invocation starts once this returns: the delivery task checks the
    /// state under the same lock `unsubscribe` takes, immediately before
    /// entering the handler, and queued messages are discarded.
    pub fn unsubscribe(&self) {
        if self.subscriber.stop() {
            self.registry.unregister(self.id());
            debug!(subscription = self.id(), pattern = %self.pattern(), "unsubscribed");
        }
    }

    /// Unsubscribe automatically once `max` messages have been accepted.
    /// The `max`-th message is still delivered.
    pub fn unsubscribe_after(&self, max: u64) {
        if self.subscriber.limit(max) {
            self.unsubscribe();
        }
    }

    /// Stop accepting messages, let queued ones run, then resolve.
    pub async fn drain(&self) {
        self.registry.drain_subscriber(&self.subscriber).await;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscription").field(&self.subscriber).finish()
    }
}
