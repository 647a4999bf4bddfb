//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check that dump file names stay inside the capture directory
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DumpConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::DumpConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &DumpConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.replay.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "replay.bind_address",
            format!("'{}' is not a socket address", config.replay.bind_address),
        ));
    }
    if config.replay.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "replay.request_timeout_secs",
            "must be greater than 0",
        ));
    }
    if config.replay.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "replay.max_body_bytes",
            "must be greater than 0",
        ));
    }

    for (field, value) in [
        ("capture.body_namespace", &config.capture.body_namespace),
        ("capture.head_extension", &config.capture.head_extension),
        ("capture.body_extension", &config.capture.body_extension),
    ] {
        if value.is_empty() || value.contains(['/', '\\']) || value == ".." {
            errors.push(ValidationError::new(
                field,
                format!("'{value}' must be a plain, non-empty name"),
            ));
        }
    }

    if let Some(auth) = &config.auth {
        if auth.username.is_empty() {
            errors.push(ValidationError::new("auth.username", "must not be empty"));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
