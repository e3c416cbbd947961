//! The `request` module implements request/reply: unique reply subjects,
//! pending-request bookkeeping and the reply/deadline race.

pub mod correlator;
pub mod inbox;

pub use correlator::{RequestCorrelator, Ticket};
pub use inbox::{SequentialTokens, TokenGenerator, UuidTokens};
