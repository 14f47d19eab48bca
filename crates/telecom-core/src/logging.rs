//! Tracing subscriber for processes that host the service
//!
//! The library only emits `tracing` events. A host that has no subscriber of
//! its own can set `logging.install = true` and let
//! [`TelecomServiceBuilder::spawn`](crate::service::TelecomServiceBuilder::spawn)
//! install one:
//!
//! ```toml
//! [logging]
//! install = true
//! filter = "rvoip_telecom_core=debug,info"
//! format = "json"
//! ```
//!
//! `RUST_LOG`, when set, wins over `filter`.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{TelecomError, TelecomResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Install a global subscriber when the service is spawned
    pub install: bool,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,
    pub format: LogFormat,
    /// Source file and line on every event
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            install: false,
            filter: "info".to_string(),
            format: LogFormat::Full,
            file_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn env_filter(&self) -> TelecomResult<EnvFilter> {
        EnvFilter::try_new(&self.filter)
            .map_err(|e| TelecomError::config(format!("invalid log filter '{}': {}", self.filter, e)))
    }
}

/// Install the global subscriber
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> TelecomResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.env_filter()?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = match config.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| TelecomError::config(format!("failed to install subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_parses_from_toml() {
        let config: LoggingConfig = toml::from_str(
            r#"
            install = true
            format = "json"
            "#,
        )
        .unwrap();
        assert!(config.install);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "info");
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_bad_filter_is_a_config_error() {
        let config = LoggingConfig {
            filter: "rvoip=loud".to_string(),
            ..Default::default()
        };
        let err = config.env_filter().unwrap_err();
        assert!(matches!(err, TelecomError::Configuration { .. }));
    }
}
