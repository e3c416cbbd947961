//! Dispatcher
//!
//! Turns one inbound message into handler invocations:
//! 1. look up matching subscriptions in the registry
//! 2. collapse each queue group to a single member chosen by the
//!    `QueueSelector`
//! 3. offer the message to every selected subscription's queue
//!
//! `deliver` never waits for a handler. Each subscription runs its handler
//! on its own task, in the order messages were accepted here, so handlers of
//! different subscriptions run concurrently and a slow or failing handler
//! only affects its own subscription.
//!
//! No ordering is promised between a publish and a subscribe issued
//! concurrently elsewhere: subscribe first when the outcome matters.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::connection::stats::Statistics;
use crate::registry::{QueueKey, QueueSelector, SubjectRegistry};
use crate::subject::Message;
use crate::subscription::{Offer, Subscriber};

enum Target {
    Single(Arc<Subscriber>),
    Group(QueueKey, Vec<Arc<Subscriber>>),
}

/// Group matched subscriptions into delivery targets, keeping the order in
/// which each target first appears.
fn targets(matched: Vec<Arc<Subscriber>>) -> Vec<Target> {
    let mut targets = Vec::with_capacity(matched.len());
    let mut groups: HashMap<QueueKey, usize> = HashMap::new();

    for subscriber in matched {
        let Some(group) = subscriber.queue_group() else {
            targets.push(Target::Single(subscriber));
            continue;
        };
        let key = QueueKey {
            pattern: subscriber.pattern().clone(),
            group: Arc::from(group),
        };
        match groups.get(&key) {
            Some(&slot) => {
                if let Target::Group(_, members) = &mut targets[slot] {
                    members.push(subscriber);
                }
            }
            None => {
                groups.insert(key.clone(), targets.len());
                targets.push(Target::Group(key, vec![subscriber]));
            }
        }
    }
    targets
}

pub struct Dispatcher {
    registry: Arc<SubjectRegistry>,
    selector: Arc<dyn QueueSelector>,
    stats: Arc<Statistics>,
}

impl Dispatcher {
    /// Queue groups are resolved with `selector`; `stats` counts inbound
    /// messages and drops.
    pub fn new(
        registry: Arc<SubjectRegistry>,
        selector: Arc<dyn QueueSelector>,
        stats: Arc<Statistics>,
    ) -> Self {
        Self {
            registry,
            selector,
            stats,
        }
    }

    pub fn registry(&self) -> &Arc<SubjectRegistry> {
        &self.registry
    }

    /// Hand `msg` to every matching subscription (one member per queue
    /// group). Returns how many subscriptions accepted it.
    pub fn deliver(&self, msg: Message) -> usize {
        self.stats.record_in(msg.size());

        let mut notified = 0;
        for target in targets(self.registry.matches(msg.subject().as_str())) {
            let accepted = match target {
                Target::Single(subscriber) => self.offer(&subscriber, &msg),
                Target::Group(key, members) => {
                    // Start at the selected member; fall through to the others
                    // if it stopped accepting in the meantime.
                    let start = self.selector.select(&key, members.len());
                    (0..members.len())
                        .map(|step| &members[(start + step) % members.len()])
                        .any(|subscriber| self.offer(subscriber, &msg))
                }
            };
            if accepted {
                notified += 1;
            }
        }

        if notified == 0 {
            self.stats.record_dropped();
            trace!(subject = %msg.subject(), "no subscription accepted message");
        }
        notified
    }

    fn offer(&self, subscriber: &Arc<Subscriber>, msg: &Message) -> bool {
        match subscriber.offer(msg.clone()) {
            Offer::Accepted { exhausted } => {
                if exhausted {
                    self.registry.unregister(subscriber.id());
                }
                true
            }
            Offer::Refused => false,
        }
    }
}
