//! Subject registry
//!
//! The registry indexes active subscriptions by pattern. Literal patterns
//! live in a hash map keyed by the full subject, so an exact lookup is a
//! single probe; wildcard patterns are kept in a list and tested one by one.
//!
//! The whole index sits behind one `RwLock`: `matches` takes the read side,
//! `register`/`unregister` the write side, so a lookup never sees a
//! half-applied change. Results are ordered by subscription id, which is
//! registration order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::dispatch::handler::{ErrorReporter, MessageHandler};
use crate::subject::Subject;
use crate::subscription::{Subscriber, Subscription, SubscriptionId};
use crate::utils::error::{Error, Result};

#[derive(Default)]
struct Index {
    literal: HashMap<Subject, Vec<Arc<Subscriber>>>,
    wildcard: Vec<Arc<Subscriber>>,
    patterns: HashMap<SubscriptionId, Subject>,
}

impl Index {
    fn insert(&mut self, subscriber: Arc<Subscriber>) {
        let pattern = subscriber.pattern().clone();
        self.patterns.insert(subscriber.id(), pattern.clone());
        if pattern.is_wildcard() {
            self.wildcard.push(subscriber);
        } else {
            self.literal.entry(pattern).or_default().push(subscriber);
        }
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Subscriber>> {
        let pattern = self.patterns.remove(&id)?;
        if pattern.is_wildcard() {
            let pos = self.wildcard.iter().position(|s| s.id() == id)?;
            return Some(self.wildcard.remove(pos));
        }

        let bucket = self.literal.get_mut(&pattern)?;
        let pos = bucket.iter().position(|s| s.id() == id)?;
        let removed = bucket.remove(pos);
        if bucket.is_empty() {
            self.literal.remove(&pattern);
        }
        Some(removed)
    }
}

pub struct SubjectRegistry {
    index: RwLock<Index>,
    next_id: AtomicU64,
    reporter: Arc<dyn ErrorReporter>,
}

impl SubjectRegistry {
    /// `reporter` receives the faults of every handler registered here.
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            next_id: AtomicU64::new(0),
            reporter,
        }
    }

    /// Validate `pattern`, start a subscriber for `handler` and index it.
    ///
    /// An empty queue group is the same as no queue group.
    pub fn register(
        self: &Arc<Self>,
        pattern: &str,
        queue_group: Option<&str>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let pattern = Subject::pattern(pattern)?;
        let queue_group = match queue_group.filter(|q| !q.is_empty()) {
            Some(q) if q.chars().any(char::is_whitespace) => {
                return Err(Error::invalid_subject(q, "queue group contains whitespace"));
            }
            Some(q) => Some(Arc::from(q)),
            None => None,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let subscriber =
            Subscriber::spawn(id, pattern, queue_group, handler, Arc::clone(&self.reporter));
        self.index.write().insert(Arc::clone(&subscriber));

        debug!(
            subscription = id,
            pattern = %subscriber.pattern(),
            queue_group = subscriber.queue_group().unwrap_or(""),
            "subscribed"
        );
        Ok(Subscription::new(subscriber, Arc::clone(self)))
    }

    /// Drop a subscription from the index. Returns false if it was not there.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        self.index.write().remove(id).is_some()
    }

    /// Every indexed subscription whose pattern matches `subject`, in
    /// registration order.
    pub fn matches(&self, subject: &str) -> Vec<Arc<Subscriber>> {
        let index = self.index.read();
        let mut found: Vec<Arc<Subscriber>> = index
            .literal
            .get(subject)
            .map(|bucket| bucket.to_vec())
            .unwrap_or_default();
        found.extend(
            index
                .wildcard
                .iter()
                .filter(|s| s.pattern().matches(subject))
                .cloned(),
        );
        drop(index);

        found.sort_unstable_by_key(|s| s.id());
        found
    }

    pub fn len(&self) -> usize {
        self.index.read().patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if some indexed subscription uses exactly this pattern.
    pub fn contains_pattern(&self, pattern: &str) -> bool {
        self.index
            .read()
            .patterns
            .values()
            .any(|p| p.as_str() == pattern)
    }

    /// All indexed subscriptions, in registration order.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        let index = self.index.read();
        let mut all: Vec<Arc<Subscriber>> = index
            .literal
            .values()
            .flatten()
            .chain(index.wildcard.iter())
            .cloned()
            .collect();
        drop(index);

        all.sort_unstable_by_key(|s| s.id());
        all
    }

    pub(crate) async fn drain_subscriber(&self, subscriber: &Arc<Subscriber>) {
        if subscriber.begin_drain() {
            self.unregister(subscriber.id());
            debug!(subscription = subscriber.id(), "draining subscription");
        }
        subscriber.finished().await;
    }

    /// Unsubscribe everything and empty the index.
    pub(crate) fn stop_all(&self) {
        let index = std::mem::take(&mut *self.index.write());
        for subscriber in index.literal.values().flatten().chain(index.wildcard.iter()) {
            subscriber.stop();
        }
    }
}
