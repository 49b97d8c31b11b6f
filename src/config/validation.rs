//! Configuration validation.
//!
//! Semantic checks on a syntactically valid config. Returns all violations,
//! not just the first.

use crate::config::schema::GatewayConfig;

/// A single semantic violation found in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: &str) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.is_empty() {
        errors.push(err("listener.bind_address", "must not be empty"));
    }
    if config.upstream.address.is_empty() {
        errors.push(err("upstream.address", "must not be empty"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(err("timeouts.request_secs", "must be greater than zero"));
    }
    if config.rate_limit.enabled {
        if config.rate_limit.requests_per_minute == 0 {
            errors.push(err("rate_limit.requests_per_minute", "must be greater than zero"));
        }
        if config.rate_limit.requests_per_hour == 0 {
            errors.push(err("rate_limit.requests_per_hour", "must be greater than zero"));
        }
        if config.rate_limit.requests_per_hour < config.rate_limit.requests_per_minute {
            errors.push(err(
                "rate_limit.requests_per_hour",
                "must be at least requests_per_minute",
            ));
        }
    }
    if config.cache.enabled && config.cache.ttl_secs == 0 {
        errors.push(err("cache.ttl_secs", "must be greater than zero"));
    }
    if config.compression.enabled {
        if config.compression.level > 9 {
            errors.push(err("compression.level", "must be between 0 and 9"));
        }
        if config.compression.compressible_types.is_empty() {
            errors.push(err("compression.compressible_types", "must not be empty"));
        }
    }
    if config.limits.max_body_size == 0 {
        errors.push(err("limits.max_body_size", "must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_violations() {
        let mut config = GatewayConfig::default();
        config.rate_limit.requests_per_minute = 0;
        config.cache.ttl_secs = 0;
        config.compression.level = 12;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "cache.ttl_secs"));
    }

    #[test]
    fn hour_ceiling_must_cover_minute_ceiling() {
        let mut config = GatewayConfig::default();
        config.rate_limit.requests_per_minute = 500;
        config.rate_limit.requests_per_hour = 100;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "rate_limit.requests_per_hour");
    }
}
