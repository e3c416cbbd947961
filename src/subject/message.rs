//! Message definitions
//!
//! `Message` is the value handed to subscriber handlers. It is immutable
//! once built; cloning is cheap because both the subject and the payload
//! are reference counted.
//!
//! Notes on fields:
//! - `subject`: concrete subject the message was published to
//! - `reply_to`: where a responder should publish its answer, if anywhere
//! - `payload`: opaque bytes, never inspected by the core

use bytes::Bytes;

use super::Subject;

/// A published message as seen by handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    subject: Subject,
    reply_to: Option<Subject>,
    payload: Bytes,
}

impl Message {
    /// A message with no reply address.
    pub fn new(subject: Subject, payload: impl Into<Bytes>) -> Self {
        Self {
            subject,
            reply_to: None,
            payload: payload.into(),
        }
    }

    /// A message whose receiver is expected to answer on `reply_to`.
    pub fn with_reply(subject: Subject, reply_to: Subject, payload: impl Into<Bytes>) -> Self {
        Self {
            subject,
            reply_to: Some(reply_to),
            payload: payload.into(),
        }
    }

    /// Concrete subject the message was published to.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Reply address, `None` unless the publisher asked for an answer.
    pub fn reply_to(&self) -> Option<&Subject> {
        self.reply_to.as_ref()
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload as UTF-8, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
