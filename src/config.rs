//! Session-scoped driver configuration.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Config file** — path passed to [`Config::load`]
//! 2. **Compiled defaults** — see each field's default value below
//!
//! There is no environment-variable layer here: unlike a long-running server with
//! per-deployment overrides, a driver session has nothing to override across
//! deployments — the serial device path is a constructor argument, not config.
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [io]
//! read_timeout_ms = 100        # idle timeout per blocking read, like VTIME
//! max_line_len = 65536
//! open_timeout_ms = 2000       # how long `open()`'s handshake may take
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;

/// Top-level driver configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transport and framing tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct IoConfig {
    /// Idle timeout per blocking read on the reader thread, in milliseconds
    /// (default 100, matching the teacher's VTIME=1 decisecond granularity). This
    /// is how often the reader re-checks the shutdown flag while the line is
    /// incomplete.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Maximum accepted line length in bytes (default 64 KiB), enforced by
    /// `frame::decode` on every inbound line.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,
    /// How long `Driver::open`'s handshake handle may be waited on by callers
    /// that use the convenience `Driver::open_blocking` helper (default 2000ms).
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

/// Structured-logging configuration (ambient — carried regardless of the spec's
/// feature non-goals, the same way the teacher always configures `tracing`).
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter level (default `info`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_read_timeout_ms() -> u64 {
    100
}
fn default_max_line_len() -> usize {
    crate::frame::MAX_LINE_LEN
}
fn default_open_timeout_ms() -> u64 {
    2000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            max_line_len: default_max_line_len(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. Missing sections fall back to their
    /// compiled defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        toml::from_str(&content).map_err(ConfigError::Parse)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read(e) => write!(f, "failed to read config file: {e}"),
            Self::Parse(e) => write!(f, "failed to parse config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.io.read_timeout_ms, 100);
        assert_eq!(config.io.max_line_len, crate::frame::MAX_LINE_LEN);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_sections() {
        let config: Config = toml::from_str("[io]\nread_timeout_ms = 250\n").unwrap();
        assert_eq!(config.io.read_timeout_ms, 250);
        assert_eq!(config.io.max_line_len, crate::frame::MAX_LINE_LEN);
        assert_eq!(config.logging.level, "info");
    }
}
