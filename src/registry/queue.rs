//! Queue-group member selection
//!
//! Subscriptions that share a pattern and a queue group split the traffic
//! between them: each message goes to exactly one member. Which member is
//! decided by a [`QueueSelector`]. Two policies ship with the crate:
//!
//! - [`RoundRobin`] (the default): members take turns, tracked per group.
//! - [`RandomSelector`]: uniform choice, optionally seeded for reproducible
//!   tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::subject::Subject;

/// Identifies one load-balanced group: a pattern plus a queue group name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueKey {
    pub pattern: Subject,
    pub group: Arc<str>,
}

pub trait QueueSelector: Send + Sync + 'static {
    /// Index in `0..members` of the member that should take the next message.
    /// `members` is never zero.
    fn select(&self, key: &QueueKey, members: usize) -> usize;
}

#[derive(Debug, Default)]
pub struct RoundRobin {
    cursors: Mutex<HashMap<QueueKey, usize>>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueSelector for RoundRobin {
    fn select(&self, key: &QueueKey, members: usize) -> usize {
        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(key.clone()).or_insert(0);
        let index = *cursor % members;
        *cursor = cursor.wrapping_add(1);
        index
    }
}

#[derive(Debug)]
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    /// A fixed `seed` makes the sequence of choices reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl QueueSelector for RandomSelector {
    fn select(&self, _key: &QueueKey, members: usize) -> usize {
        self.rng.lock().gen_range(0..members)
    }
}

/// Selection policy as named in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    #[default]
    RoundRobin,
    Random,
}

impl QueuePolicy {
    /// Build the selector for this policy. `seed` only affects `Random`.
    pub fn selector(self, seed: Option<u64>) -> Arc<dyn QueueSelector> {
        match self {
            QueuePolicy::RoundRobin => Arc::new(RoundRobin::new()),
            QueuePolicy::Random => Arc::new(RandomSelector::new(seed)),
        }
    }
}
