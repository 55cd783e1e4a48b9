//! File loading with environment overrides
//!
//! Files are TOML. Every value can be overridden by an environment variable
//! `OMM__<FIELD>`, with `__` separating nested tables, for example
//! `OMM__RECONNECT__MAX_DELAY_MS=10000`. Paths accept `$VAR` expansion.

use crate::consumer::ConsumerConfig;
use crate::error::{ConfigError, Result};
use crate::provider::{IProviderConfig, NiProviderConfig};
use config_crate::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "OMM";
/// Separator between prefix and nested keys
pub const ENV_SEPARATOR: &str = "__";

/// A configuration that can be loaded from a file
pub trait Loadable: DeserializeOwned + Serialize {
    fn validate(&self) -> Result<()>;

    /// Expand environment references in path-valued settings
    fn expand_paths(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Loadable for ConsumerConfig {
    fn validate(&self) -> Result<()> {
        ConsumerConfig::validate(self)
    }

    fn expand_paths(&mut self) -> Result<()> {
        ConsumerConfig::expand_paths(self)
    }
}

impl Loadable for IProviderConfig {
    fn validate(&self) -> Result<()> {
        IProviderConfig::validate(self)
    }

    fn expand_paths(&mut self) -> Result<()> {
        IProviderConfig::expand_paths(self)
    }
}

impl Loadable for NiProviderConfig {
    fn validate(&self) -> Result<()> {
        NiProviderConfig::validate(self)
    }
}

/// Load and validate `path` with `OMM__` environment overrides
pub fn load<T: Loadable>(path: impl AsRef<Path>) -> Result<T> {
    load_with_prefix(path, ENV_PREFIX)
}

/// Load with a custom environment prefix
pub fn load_with_prefix<T: Loadable>(path: impl AsRef<Path>, prefix: &str) -> Result<T> {
    let path = path.as_ref();
    let load_error = |source| ConfigError::Load {
        path: path.to_path_buf(),
        source,
    };

    let settings = Config::builder()
        .add_source(File::from(path).format(FileFormat::Toml).required(true))
        .add_source(
            Environment::with_prefix(prefix)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()
        .map_err(load_error)?;

    let mut config: T = settings.try_deserialize().map_err(load_error)?;
    config.expand_paths()?;
    config.validate()?;
    info!(path = %path.display(), "Configuration loaded");
    Ok(config)
}

/// Render a configuration as TOML
pub fn to_toml<T: Serialize>(config: &T) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize {
        reason: e.to_string(),
    })
}

/// Write a configuration to `path` as TOML
pub fn save<T: Serialize>(config: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let text = to_toml(config)?;
    std::fs::write(path, text).map_err(|e| ConfigError::Serialize {
        reason: format!("{}: {e}", path.display()),
    })?;
    debug!(path = %path.display(), "Configuration written");
    Ok(())
}

pub(crate) fn expand_path(field: &str, path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded =
        shellexpand::env(&raw).map_err(|e| ConfigError::invalid(field, e.to_string()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::BackpressureMode;
    use crate::dictionary::DictionarySource;
    use crate::service::AdminControl;
    use std::fs;
    use tempfile::tempdir;

    const CONSUMER: &str = r#"
name = "Consumer_1"
user_name = "alice"
request_timeout_ms = 2000
support_rtt = true

[[channels]]
name = "Primary"
host = "localhost:14002"
guaranteed_output_buffers = 10
max_output_buffers = 20
backpressure = "reject"

[[channels]]
name = "Backup"
host = "backup:14002"

[reconnect]
min_delay_ms = 100
max_delay_ms = 1000
attempt_limit = 5

[dictionary]
mode = "download"
"#;

    #[test]
    fn consumer_file_loads_with_defaults_filled_in() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("consumer.toml");
        fs::write(&path, CONSUMER).unwrap();

        let config: ConsumerConfig = load_with_prefix(&path, "OMM_LOADER_PLAIN").unwrap();
        assert_eq!(config.user_name, "alice");
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].tuning.max_output_buffers, 20);
        assert_eq!(config.channels[0].tuning.backpressure, BackpressureMode::Reject);
        assert_eq!(config.channels[1].tuning.max_output_buffers, 100);
        assert_eq!(config.reconnect.attempt_limit, 5);
        assert_eq!(config.dictionary, DictionarySource::Download);
        assert_eq!(config.max_nesting_depth, 32);
        assert!(config.support_rtt);
    }

    #[test]
    fn environment_overrides_file_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("consumer.toml");
        fs::write(&path, CONSUMER).unwrap();

        std::env::set_var("OMM_LOADER_ENV__USER_NAME", "bob");
        std::env::set_var("OMM_LOADER_ENV__RECONNECT__MAX_DELAY_MS", "3000");
        let config: ConsumerConfig = load_with_prefix(&path, "OMM_LOADER_ENV").unwrap();
        std::env::remove_var("OMM_LOADER_ENV__USER_NAME");
        std::env::remove_var("OMM_LOADER_ENV__RECONNECT__MAX_DELAY_MS");

        assert_eq!(config.user_name, "bob");
        assert_eq!(config.reconnect.max_delay_ms, 3000);
    }

    #[test]
    fn invalid_file_values_fail_validation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("consumer.toml");
        fs::write(
            &path,
            r#"
user_name = "alice"
[[channels]]
name = "Primary"
host = "no-port-here"
"#,
        )
        .unwrap();
        let err = load_with_prefix::<ConsumerConfig>(&path, "OMM_LOADER_BAD").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load::<ConsumerConfig>("/nonexistent/omm.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Load { .. }));
    }

    #[test]
    fn provider_config_survives_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("provider.toml");
        std::env::set_var("OMM_TEST_DICT_DIR", "/opt/dict");
        let mut config = IProviderConfig::builder()
            .bind("127.0.0.1:14002")
            .unwrap()
            .service(crate::ServiceConfig::new(1, "DIRECT_FEED").unwrap())
            .unwrap()
            .dictionary_admin(AdminControl::UserControl)
            .build()
            .unwrap();
        config.dictionary = Some(crate::DictionaryFiles {
            field_path: "$OMM_TEST_DICT_DIR/RDMFieldDictionary".into(),
            enum_path: "$OMM_TEST_DICT_DIR/enumtype.def".into(),
        });
        save(&config, &path).unwrap();

        let loaded: IProviderConfig = load_with_prefix(&path, "OMM_LOADER_SAVE").unwrap();
        assert_eq!(loaded.services, config.services);
        assert_eq!(loaded.dictionary_admin, AdminControl::UserControl);
        assert_eq!(
            loaded.dictionary.unwrap().field_path,
            PathBuf::from("/opt/dict/RDMFieldDictionary")
        );
    }
}
