//! The `error` module defines the error types returned by `subjectbus`.
//!
//! Caller-facing failures are collected in [`Error`] and returned
//! synchronously from the operation that triggered them. Failures raised by
//! subscriber handlers are a different kind of thing: they are wrapped in
//! [`HandlerError`] and handed to an `ErrorReporter`, never returned to the
//! publisher.

use thiserror::Error;

use crate::subscription::SubscriptionId;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by connection, subscription and request operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A subject or pattern failed validation.
    #[error("invalid subject {subject:?}: {reason}")]
    InvalidSubject {
        subject: String,
        reason: &'static str,
    },

    /// The connection is draining or closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The connection has not been established yet.
    #[error("connection has not been established")]
    NotConnected,

    /// No reply arrived before the request deadline.
    #[error("request timed out")]
    Timeout,

    /// None of the configured servers accepted the connection.
    #[error("no servers available for connection")]
    NoServers,

    #[error("message has no reply subject")]
    NoReplySubject,

    /// The token generator kept producing reply subjects that are in use.
    #[error("could not allocate a unique reply subject after {0} attempts")]
    ReplySubjectExhausted(usize),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub(crate) fn invalid_subject(subject: &str, reason: &'static str) -> Self {
        Error::InvalidSubject {
            subject: subject.to_string(),
            reason,
        }
    }
}

/// Errors raised by a broker link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("server {0} is unreachable")]
    Unreachable(String),

    #[error("broker link is closed")]
    Closed,
}

/// A subscriber handler fault, reported to the observability collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler for subscription {subscription} failed on {subject:?}: {kind}")]
pub struct HandlerError {
    pub subscription: SubscriptionId,
    pub subject: String,
    pub kind: HandlerErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerErrorKind {
    /// The handler returned an error.
    #[error("returned error: {0}")]
    Failed(String),

    /// The handler panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}
