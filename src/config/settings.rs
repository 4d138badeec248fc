//! Runtime settings sections
//!
//! - [`DeviceConfig`] - Simulated device heap and stream naming
//! - [`LoggingConfig`] - Log filter and optional log file
//! - [`TapeConfig`] - Automatic recording of graph calls

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,sensorgraph=debug";

/// Default name of the graph's stream
pub const DEFAULT_STREAM_NAME: &str = "sensorgraph";

/// Device settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Upper bound on device allocations; `None` for unlimited
    pub memory_limit_bytes: Option<u64>,

    /// Name given to the stream worker thread
    pub stream_name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: None,
            stream_name: DEFAULT_STREAM_NAME.to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub filter: String,

    /// Also write logs to this file
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }
}

/// Tape settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapeConfig {
    /// Start recording as soon as a graph is built from this config
    pub record_on_start: bool,

    /// Where recorded tapes are saved
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_config_default() {
        let config = DeviceConfig::default();
        assert!(config.memory_limit_bytes.is_none());
        assert_eq!(config.stream_name, DEFAULT_STREAM_NAME);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{"log_file": "/tmp/sg.log"}"#).unwrap();
        assert_eq!(config.filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/sg.log")));
    }
}
