//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$LAZYMIME_CONFIG` (environment variable)
//! 2. `~/.config/lazymime/config.toml` (Linux/macOS)
//!    `%APPDATA%\lazymime\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Parser tuning.
    pub parser: ParserConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Parser tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum number of bytes of a single line kept for classification
    /// (default: 4096). Longer lines are still consumed in full.
    pub max_line_length: usize,
    /// Read buffer size in bytes (default: 65536 = 64 KB).
    pub read_buffer_size: usize,
    /// Treat a leading mbox `From ` envelope line as outside the message.
    pub skip_mbox_separator: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_line_length: 4096,
            read_buffer_size: 64 * 1024, // 64 KB
            skip_mbox_separator: true,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("LAZYMIME_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("lazymime").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lazymime")
}

/// Name of the log file inside the cache directory.
pub const LOG_FILE_NAME: &str = "lazymime.log";

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join(LOG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.parser.max_line_length, 4096);
        assert!(cfg.parser.skip_mbox_separator);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[parser]
max_line_length = 998
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.parser.max_line_length, 998);
        assert_eq!(cfg.parser.read_buffer_size, 64 * 1024);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_log_file_path_honors_cache_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/lazymime-test"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/lazymime-test/lazymime.log")
        );
    }
}
