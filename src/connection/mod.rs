//! The `connection` module is the public face of the crate: connecting,
//! publishing, subscribing, requests and the shutdown sequence.

#[allow(clippy::module_inception)]
pub mod connection;
pub mod options;
pub mod stats;

pub use connection::{Connection, ConnectionState, connect};
pub use options::ConnectOptions;
pub use stats::{Statistics, StatsSnapshot};

#[cfg(test)]
mod tests;
