//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for httpdump.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DumpConfig {
    /// Replay server settings.
    pub replay: ReplayConfig,

    /// Capture (recording) settings.
    pub capture: CaptureConfig,

    /// Credentials for the replay server.
    pub auth: Option<AuthConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Replay server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Directory holding recorded exchanges. Without one, every request
    /// is answered with `500 not implemented`.
    pub dir: Option<PathBuf>,

    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Total time allowed per replayed request, in seconds.
    pub request_timeout_secs: u64,

    /// Largest live request body read for matching.
    pub max_body_bytes: usize,

    /// Live query keys that may be missing from a recording.
    pub ignored_query_keys: Vec<String>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            dir: None,
            bind_address: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            ignored_query_keys: Vec::new(),
        }
    }
}

/// Capture configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory head dumps are written to.
    pub dir: PathBuf,

    /// Subdirectory of `dir` that receives response bodies.
    pub body_namespace: String,

    /// Extension of numbered head dumps.
    pub head_extension: String,

    /// Extension of body dumps.
    pub body_extension: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dumps"),
            body_namespace: "bodies".to_string(),
            head_extension: "log".to_string(),
            body_extension: "json".to_string(),
        }
    }
}

/// Replay server credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: DumpConfig = toml::from_str("[replay]\ndir = \"fixtures\"\n").unwrap();

        assert_eq!(config.replay.dir, Some(PathBuf::from("fixtures")));
        assert_eq!(config.replay.bind_address, "127.0.0.1:8080");
        assert_eq!(config.capture.body_namespace, "bodies");
        assert!(config.auth.is_none());
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn test_full_config() {
        let config: DumpConfig = toml::from_str(
            r#"
            [replay]
            bind_address = "0.0.0.0:9000"
            ignored_query_keys = ["_", "ts"]

            [capture]
            dir = "/tmp/dumps"
            body_extension = "body"

            [auth]
            username = "admin"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.replay.ignored_query_keys, vec!["_", "ts"]);
        assert_eq!(config.capture.dir, PathBuf::from("/tmp/dumps"));
        assert_eq!(config.capture.body_extension, "body");
        assert_eq!(config.capture.head_extension, "log");
        assert_eq!(config.auth.unwrap().username, "admin");
    }
}
