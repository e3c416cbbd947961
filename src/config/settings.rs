use serde::Deserialize;

use crate::registry::QueuePolicy;

/// Top-level configuration settings for the application.
///
/// Includes settings for the connection, message dispatch and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub dispatch: DispatchSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the connection.
///
/// `servers` are tried in order on connect; the first one that accepts wins.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub servers: Vec<String>,
    pub name: Option<String>,
    pub inbox_prefix: String,
    pub request_timeout_ms: u64,
    pub drain_timeout_secs: u64,
}

/// Configuration settings for message dispatch.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DispatchSettings {
    pub queue_policy: QueuePolicy,
    /// Seed for the `random` queue policy. Ignored by `round_robin`.
    pub random_seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub connection: Option<PartialConnectionSettings>,
    pub dispatch: Option<PartialDispatchSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialConnectionSettings {
    pub servers: Option<Vec<String>>,
    pub name: Option<String>,
    pub inbox_prefix: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialDispatchSettings {
    pub queue_policy: Option<QueuePolicy>,
    pub random_seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings {
                servers: vec!["nats://127.0.0.1:4222".to_string()],
                name: None,
                inbox_prefix: "_INBOX".to_string(),
                request_timeout_ms: 3000,
                drain_timeout_secs: 30,
            },
            dispatch: DispatchSettings {
                queue_policy: QueuePolicy::RoundRobin,
                random_seed: None,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fill everything `partial` leaves out from the defaults.
    pub fn merged(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let connection = partial.connection.unwrap_or_default();
        let dispatch = partial.dispatch.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();

        Settings {
            connection: ConnectionSettings {
                servers: connection
                    .servers
                    .unwrap_or(default.connection.servers),
                name: connection.name.or(default.connection.name),
                inbox_prefix: connection
                    .inbox_prefix
                    .unwrap_or(default.connection.inbox_prefix),
                request_timeout_ms: connection
                    .request_timeout_ms
                    .unwrap_or(default.connection.request_timeout_ms),
                drain_timeout_secs: connection
                    .drain_timeout_secs
                    .unwrap_or(default.connection.drain_timeout_secs),
            },
            dispatch: DispatchSettings {
                queue_policy: dispatch
                    .queue_policy
                    .unwrap_or(default.dispatch.queue_policy),
                random_seed: dispatch.random_seed.or(default.dispatch.random_seed),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}
