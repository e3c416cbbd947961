mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{ConnectionSettings, DispatchSettings, LoggingSettings, Settings};

/// Loads the configuration from `config/default` and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the file at `path` (any extension the
/// `config` crate understands, optional) and `SUBJECTBUS__*` environment
/// variables, then merges the result over the defaults.
///
/// Environment keys use `__` between levels, e.g.
/// `SUBJECTBUS__CONNECTION__INBOX_PREFIX`. `SUBJECTBUS__CONNECTION__SERVERS`
/// takes a comma-separated list.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("SUBJECTBUS")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("connection.servers")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merged(partial))
}
