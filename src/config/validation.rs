use std::{collections::HashSet, net::SocketAddr};

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::{config::models::GatewayConfig, core::network::NetworkMatcher};

/// Service names double as URL path segments; the charset is restricted
/// accordingly.
static SERVICE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z-]+$").expect("valid service name regex"));

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid service name '{name}': must match ^[A-Za-z-]+$")]
    InvalidServiceName { name: String },

    #[error("Duplicate service name '{name}' (names are case-insensitive)")]
    DuplicateService { name: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator. Any error here is fatal at startup:
/// the gateway must not serve with an inconsistent registry.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.services.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "services".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (name, entry) in &config.services {
            if !SERVICE_NAME_RE.is_match(name) {
                errors.push(ValidationError::InvalidServiceName { name: name.clone() });
            }

            if !seen.insert(name.to_lowercase()) {
                errors.push(ValidationError::DuplicateService {
                    name: name.to_lowercase(),
                });
            }

            if let Err(e) = Self::validate_url(&entry.target, &format!("service '{name}' target"))
            {
                errors.push(e);
            }

            if let Some(source) = &entry.allowlist_url {
                if let Err(e) =
                    Self::validate_url(source, &format!("service '{name}' allowlist_url"))
                {
                    errors.push(e);
                }
            }

            for range in &entry.static_allowed_ranges {
                if let Err(e) = NetworkMatcher::parse(range) {
                    errors.push(ValidationError::InvalidField {
                        field: format!("service '{name}' static_allowed_ranges"),
                        message: e.to_string(),
                    });
                }
            }
        }

        if config.allowlist.refresh_interval_mins == 0 {
            errors.push(ValidationError::InvalidField {
                field: "allowlist.refresh_interval_mins".to_string(),
                message: "must be at least 1 minute".to_string(),
            });
        }
        if config.allowlist.fetch_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "allowlist.fetch_timeout_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if config.upstream.request_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "upstream.request_timeout_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_url(value: &str, field: &str) -> ValidationResult<()> {
        match Url::parse(value) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                if url.host_str().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: field.to_string(),
                        message: "URL has no host".to_string(),
                    });
                }
                Ok(())
            }
            Ok(url) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let messages: Vec<String> = errors.iter().map(|e| format!("  • {e}")).collect();
        format!(
            "Found {} validation error(s):\n{}",
            errors.len(),
            messages.join("\n")
        )
    }
}
