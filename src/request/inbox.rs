use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of the unique tokens appended to the inbox prefix to form reply
/// subjects. Injected so tests can force collisions or predict subjects.
pub trait TokenGenerator: Send + Sync + 'static {
    fn next_token(&self) -> String;
}

/// Random UUID v4 tokens in their 32-character simple form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTokens;

impl TokenGenerator for UuidTokens {
    fn next_token(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Deterministic tokens: `1`, `2`, `3`, ...
#[derive(Debug, Default)]
pub struct SequentialTokens {
    next: AtomicU64,
}

impl SequentialTokens {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenGenerator for SequentialTokens {
    fn next_token(&self) -> String {
        (self.next.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}
