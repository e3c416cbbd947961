//! The `subject` module defines the vocabulary every other module speaks:
//! validated subject names, wildcard matching, and the immutable
//! [`Message`] value.

pub mod message;
#[allow(clippy::module_inception)]
pub mod subject;

pub use message::Message;
pub use subject::{Subject, matches};
