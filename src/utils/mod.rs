//! The `utils` module holds the pieces shared by every other module: the
//! error taxonomy and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{Error, HandlerError, HandlerErrorKind, Result, TransportError};

#[cfg(test)]
mod tests;
