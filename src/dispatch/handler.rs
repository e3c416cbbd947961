//! Handler and reporter capabilities
//!
//! A subscription owns a [`MessageHandler`]. Any `async` closure or `fn`
//! taking a [`Message`] and returning a [`HandlerResult`] is a handler, so
//! most callers never implement the trait by hand; test doubles and stateful
//! handlers implement it directly.
//!
//! Handler faults are handed to an [`ErrorReporter`]. The default,
//! [`TracingReporter`], logs them.

use std::future::Future;

use async_trait::async_trait;
use tracing::error;

use crate::subject::Message;
use crate::utils::error::HandlerError;

/// Boxed error a handler may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<(), BoxError>;

#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, msg: Message) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, msg: Message) -> HandlerResult {
        (self)(msg).await
    }
}

/// Observability collaborator that receives contained handler faults.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, error: &HandlerError);
}

impl<F> ErrorReporter for F
where
    F: Fn(&HandlerError) + Send + Sync + 'static,
{
    fn report(&self, error: &HandlerError) {
        (self)(error)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &HandlerError) {
        error!(
            subscription = error.subscription,
            subject = %error.subject,
            "subscriber handler failed: {}",
            error.kind
        );
    }
}
