use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Configuration section name, inside the node configuration file.
pub const SERVICE_CONFIG_SECTION: &str = "text2sql_service";
/// Prefix of the environment variables overriding the configuration file,
/// e.g. `TEXT2SQL_SERVICE__SERVICE_BIND_ADDRESS`.
const ENV_PREFIX: &str = "TEXT2SQL_SERVICE";

/// Configuration for the text2sql HTTP service.
#[derive(Debug, Deserialize)]
pub struct Text2SqlServiceConfig {
    /// Bind address for the service.
    ///
    /// This field specifies the address and port on which the service will bind,
    /// e.g. `0.0.0.0:8080`.
    pub service_bind_address: String,
}

impl Text2SqlServiceConfig {
    /// Creates a new `Text2SqlServiceConfig` instance from a configuration file.
    ///
    /// # Arguments
    ///
    /// * `config_file_path` - Path to the configuration file. The file should be in a format
    ///   supported by the `config` crate (e.g., YAML, JSON, TOML) and contain a "text2sql_service"
    ///   section with the required configuration fields.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if:
    /// * The configuration file cannot be read or parsed
    /// * The "text2sql_service" section is missing from the configuration
    /// * The configuration format doesn't match the expected structure
    pub fn from_file_path<P: AsRef<Path>>(config_file_path: P) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(config_file_path.as_ref()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .keep_prefix(true)
                    .separator("__"),
            )
            .build()?;
        config.get::<Self>(SERVICE_CONFIG_SECTION)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_service_config_from_file() {
        let file = write_config(
            r#"
            [text2sql_service]
            service_bind_address = "127.0.0.1:8080"
            "#,
        );

        let config = Text2SqlServiceConfig::from_file_path(file.path()).unwrap();
        assert_eq!(config.service_bind_address, "127.0.0.1:8080");
    }

    #[test]
    #[serial]
    fn test_service_config_env_override() {
        let file = write_config(
            r#"
            [text2sql_service]
            service_bind_address = "127.0.0.1:8080"
            "#,
        );

        std::env::set_var("TEXT2SQL_SERVICE__SERVICE_BIND_ADDRESS", "0.0.0.0:9000");
        let config = Text2SqlServiceConfig::from_file_path(file.path());
        std::env::remove_var("TEXT2SQL_SERVICE__SERVICE_BIND_ADDRESS");

        assert_eq!(config.unwrap().service_bind_address, "0.0.0.0:9000");
    }

    #[test]
    #[serial]
    fn test_service_config_missing_section() {
        let file = write_config(
            r#"
            [text2sql_inference]
            model_id = "tscholak/cxmefzzi"
            "#,
        );

        assert!(Text2SqlServiceConfig::from_file_path(file.path()).is_err());
    }
}
