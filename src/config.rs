//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MIMEFIX_CONFIG` (environment variable)
//! 2. `~/.config/mimefix/config.toml` (Linux/macOS)
//!    `%APPDATA%\mimefix\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::content::LineEnding;
use crate::transform::TransformPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repair and decode policy.
    pub policy: PolicyConfig,
    /// Output file handling.
    pub output: OutputConfig,
    /// Logging settings.
    pub log: LogConfig,
}

/// Repair and decode policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Types the decode pass may strip an encoding from, as `type` or
    /// `type/subtype` patterns.
    pub decode_types: Vec<String>,
    /// Types whose content is sniffed and corrected when mislabeled.
    pub sniff_types: Vec<String>,
    /// Charset to convert text/plain parts to. Empty disables conversion.
    pub target_charset: Option<String>,
    /// Line endings for decoded text: "lf" or "crlf".
    pub line_ending: String,
    /// Maximum message/multipart nesting depth.
    pub max_nesting_depth: usize,
    /// Attempts allowed when generating a collision-free boundary.
    pub boundary_retry_limit: usize,
}

/// Output file handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Overwrite existing output files.
    pub clobber: bool,
    /// Keep the original as `<name>.orig` when rewriting in place.
    pub backup: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: String,
    /// Override directory for the log file.
    pub log_dir: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            decode_types: vec!["text".to_string()],
            sniff_types: vec!["application/octet-stream".to_string()],
            target_charset: None,
            line_ending: "lf".to_string(),
            max_nesting_depth: crate::parser::DEFAULT_MAX_DEPTH,
            boundary_retry_limit: 8,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            clobber: false,
            backup: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl PolicyConfig {
    /// Build the transform policy this configuration describes.
    pub fn to_policy(&self) -> TransformPolicy {
        TransformPolicy {
            decode_types: self.decode_types.clone(),
            sniff_types: self.sniff_types.clone(),
            target_charset: self
                .target_charset
                .clone()
                .filter(|c| !c.trim().is_empty()),
            line_ending: if self.line_ending.eq_ignore_ascii_case("crlf") {
                LineEnding::CrLf
            } else {
                LineEnding::Lf
            },
            max_nesting_depth: self.max_nesting_depth,
            boundary_retry_limit: self.boundary_retry_limit,
        }
    }
}

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
    if let Ok(env_path) = std::env::var("MIMEFIX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mimefix").join("config.toml"))
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    let dir = config.log.log_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mimefix")
    });
    dir.join("mimefix.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.policy.decode_types, vec!["text"]);
        assert_eq!(cfg.policy.max_nesting_depth, 20);
        assert!(!cfg.output.clobber);
        assert!(cfg.output.backup);
        assert_eq!(cfg.log.level, "warn");
    }

    #[test]
    fn test_policy_conversion() {
        let mut cfg = PolicyConfig::default();
        cfg.target_charset = Some("utf-8".to_string());
        cfg.line_ending = "CRLF".to_string();
        let policy = cfg.to_policy();
        assert_eq!(policy.target_charset.as_deref(), Some("utf-8"));
        assert_eq!(policy.line_ending, LineEnding::CrLf);
    }

    #[test]
    fn test_blank_charset_disables_conversion() {
        let cfg = PolicyConfig {
            target_charset: Some("  ".to_string()),
            ..PolicyConfig::default()
        };
        assert!(cfg.to_policy().target_charset.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [policy]
            target_charset = "utf-8"
            max_nesting_depth = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.policy.max_nesting_depth, 5);
        assert_eq!(cfg.policy.target_charset.as_deref(), Some("utf-8"));
        assert_eq!(cfg.policy.decode_types, vec!["text"]);
        assert!(cfg.output.backup);
    }
}
