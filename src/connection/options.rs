use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::dispatch::handler::{ErrorReporter, TracingReporter};
use crate::registry::{QueueSelector, RoundRobin};
use crate::request::{TokenGenerator, UuidTokens};
use crate::transport::Connector;

/// Everything a [`Connection`](super::Connection) needs, collaborators
/// included. Built with chained setters starting from [`ConnectOptions::new`].
#[derive(Clone)]
pub struct ConnectOptions {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) servers: Vec<String>,
    pub(crate) name: Option<String>,
    pub(crate) inbox_prefix: String,
    pub(crate) drain_timeout: Duration,
    pub(crate) queue_selector: Arc<dyn QueueSelector>,
    pub(crate) token_generator: Arc<dyn TokenGenerator>,
    pub(crate) error_reporter: Arc<dyn ErrorReporter>,
}

impl ConnectOptions {
    /// Defaults: no servers, `_INBOX` prefix, 30 s drain timeout,
    /// round-robin queue groups, UUID reply tokens, tracing error reporter.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            servers: Vec::new(),
            name: None,
            inbox_prefix: "_INBOX".to_string(),
            drain_timeout: Duration::from_secs(30),
            queue_selector: Arc::new(RoundRobin::new()),
            token_generator: Arc::new(UuidTokens),
            error_reporter: Arc::new(TracingReporter),
        }
    }

    /// Options described by loaded settings.
    pub fn from_settings(settings: &Settings, connector: Arc<dyn Connector>) -> Self {
        let connection = &settings.connection;
        let mut options = Self::new(connector)
            .servers(connection.servers.iter().cloned())
            .inbox_prefix(connection.inbox_prefix.clone())
            .drain_timeout(Duration::from_secs(connection.drain_timeout_secs))
            .queue_selector(
                settings
                    .dispatch
                    .queue_policy
                    .selector(settings.dispatch.random_seed),
            );
        if let Some(name) = &connection.name {
            options = options.name(name.clone());
        }
        options
    }

    /// Append one server URL. Servers are tried in the order added.
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.servers.push(server.into());
        self
    }

    /// Append several server URLs.
    pub fn servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers.extend(servers.into_iter().map(Into::into));
        self
    }

    /// Client name, used in log output.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Prefix for generated reply subjects. Must itself be a concrete
    /// subject, otherwise requests fail with `InvalidSubject`.
    pub fn inbox_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inbox_prefix = prefix.into();
        self
    }

    /// How long [`drain`](super::Connection::drain) waits before giving up.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Picks the member of a queue group that receives each message.
    pub fn queue_selector(mut self, selector: Arc<dyn QueueSelector>) -> Self {
        self.queue_selector = selector;
        self
    }

    /// Source of the unique last segment of reply subjects.
    pub fn token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.token_generator = tokens;
        self
    }

    /// Receives handler failures and panics.
    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Configured servers, in connect order.
    pub fn server_list(&self) -> &[String] {
        &self.servers
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("servers", &self.servers)
            .field("name", &self.name)
            .field("inbox_prefix", &self.inbox_prefix)
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}
