//! # subjectbus
//!
//! `subjectbus` is the client-side core of a subject-based messaging system:
//! subscribe to dot-separated subjects (with `*` and `>` wildcards), publish
//! fire-and-forget messages, and make request/reply calls with a deadline.
//! The network link to a broker is abstracted behind the `transport` traits;
//! an in-process broker is included.
//!
//! ## Core Modules
//!
//! - `subject`: subject validation, wildcard matching and the `Message` value.
//! - `registry`: index of active subscriptions and queue-group selection.
//! - `dispatch`: routes inbound messages to handlers and reports handler faults.
//! - `subscription`: one registered interest, its lifecycle and delivery task.
//! - `request`: reply subjects and the reply/deadline race of a request.
//! - `connection`: the public entry point and the connection lifecycle.
//! - `transport`: the broker link seam and the in-process `LocalBroker`.
//! - `config`: loading settings from files and the environment.
//! - `utils`: error types and logging setup.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use subjectbus::{BoxError, ConnectOptions, LocalBroker, Message, connect};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = LocalBroker::new("nats://127.0.0.1:4222");
//! let nc = connect(ConnectOptions::new(Arc::new(broker)).server("nats://127.0.0.1:4222")).await?;
//!
//! let responder = nc.clone();
//! nc.subscribe("help", move |msg: Message| {
//!     let nc = responder.clone();
//!     async move {
//!         nc.respond(&msg, "I help you")?;
//!         Ok::<(), BoxError>(())
//!     }
//! })?;
//!
//! let reply = nc.request("help", "Plz help me", Duration::from_secs(3)).await?;
//! assert_eq!(reply.payload_str(), Some("I help you"));
//! nc.drain().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod registry;
pub mod request;
pub mod subject;
pub mod subscription;
pub mod transport;
pub mod utils;

pub use connection::{ConnectOptions, Connection, ConnectionState, StatsSnapshot, connect};
pub use dispatch::{BoxError, ErrorReporter, HandlerResult, MessageHandler};
pub use subject::{Message, Subject};
pub use subscription::{Subscription, SubscriptionState};
pub use transport::LocalBroker;
pub use utils::error::{Error, HandlerError, Result};
