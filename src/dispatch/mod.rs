//! The `dispatch` module routes inbound messages to subscription handlers
//! and defines the handler and error-reporting capabilities.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::Dispatcher;
pub use handler::{BoxError, ErrorReporter, HandlerResult, MessageHandler, TracingReporter};
