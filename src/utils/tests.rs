use super::error::{Error, HandlerError, HandlerErrorKind, TransportError};
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
fn parse_level_falls_back_to_info() {
    assert_eq!(logging::parse_level("TRACE"), tracing::Level::TRACE);
    assert_eq!(logging::parse_level("warning"), tracing::Level::WARN);
    assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
}

#[test]
fn transport_errors_convert_into_error() {
    let err: Error = TransportError::Closed.into();
    assert_eq!(err, Error::Transport(TransportError::Closed));
    assert_eq!(err.to_string(), "broker link is closed");
}

#[test]
fn handler_error_display_names_subscription_and_subject() {
    let err = HandlerError {
        subscription: 7,
        subject: "channel1".to_string(),
        kind: HandlerErrorKind::Failed("boom".to_string()),
    };
    assert_eq!(
        err.to_string(),
        "handler for subscription 7 failed on \"channel1\": returned error: boom"
    );
}
