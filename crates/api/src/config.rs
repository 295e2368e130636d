//! Service configuration

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use gesture::DEFAULT_JPEG_QUALITY;
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Config file looked up next to the working directory (any supported extension)
pub const CONFIG_FILE: &str = "gesture";

/// Prefix for environment overrides, e.g. `GESTURE_BIND_ADDR`
pub const ENV_PREFIX: &str = "GESTURE";

/// Runtime settings for the HTTP service.
///
/// Engine parameters (arena size, operator set) are compile-time constants
/// and cannot be set here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Socket address to listen on
    pub bind_addr: String,

    /// Model blob, read once at startup
    pub model_path: String,

    /// JPEG quality for `/capture` responses (1..=100)
    pub jpeg_quality: u8,

    /// Max tracing level (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            model_path: "models/gesture.gmdl".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load from an optional `file` plus `GESTURE_*` environment variables
    pub fn load(file: &str) -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(file).required(false))
                .add_source(Environment::with_prefix(ENV_PREFIX)),
        )
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let mut config: Self = builder.build()?.try_deserialize()?;
        config.jpeg_quality = config.jpeg_quality.clamp(1, 100);
        Ok(config)
    }

    /// Parsed log level; unknown names fall back to `info`
    pub fn log_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<ServiceConfig, ConfigError> {
        ServiceConfig::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.log_level(), Level::INFO);
    }

    #[test]
    fn test_partial_override() {
        let config = from_toml("model_path = \"/data/hand.gmdl\"\nlog_level = \"debug\"").unwrap();
        assert_eq!(config.model_path, "/data/hand.gmdl");
        assert_eq!(config.log_level(), Level::DEBUG);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(from_toml("jpeg_quality = 0").unwrap().jpeg_quality, 1);
        assert_eq!(from_toml("jpeg_quality = 250").unwrap().jpeg_quality, 100);
    }

    #[test]
    fn test_unknown_level_falls_back() {
        let config = from_toml("log_level = \"chatty\"").unwrap();
        assert_eq!(config.log_level(), Level::INFO);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config = ServiceConfig::load("/nonexistent/gesture-config").unwrap();
        assert_eq!(config.jpeg_quality, 80);
    }
}
