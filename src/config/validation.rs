//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the collector host is a usable URL
//! - Check values embedded into HTML cannot break out of an attribute
//! - Validate value ranges (timeouts > 0, queue sizes > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("umami.umami_host is not set")]
    MissingUmamiHost,

    #[error("umami.umami_host is not an http(s) URL: {0}")]
    InvalidUmamiHost(String),

    #[error("umami.website_id is not set")]
    MissingWebsiteId,

    #[error("umami.website_id contains characters not allowed in an HTML attribute")]
    UnsafeWebsiteId,

    #[error("umami.domains entry {0:?} contains characters not allowed in an HTML attribute")]
    UnsafeDomain(String),

    #[error("umami.forward_path is empty")]
    EmptyForwardPath,

    #[error("umami.anchor is empty")]
    EmptyAnchor,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let umami = &config.umami;

    if umami.umami_host.trim().is_empty() {
        errors.push(ValidationError::MissingUmamiHost);
    } else {
        match Url::parse(umami.umami_base()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::InvalidUmamiHost(format!(
                "unsupported scheme {}",
                url.scheme()
            ))),
            Err(e) => errors.push(ValidationError::InvalidUmamiHost(e.to_string())),
        }
    }

    if umami.website_id.is_empty() {
        errors.push(ValidationError::MissingWebsiteId);
    } else if !is_attribute_safe(&umami.website_id) {
        errors.push(ValidationError::UnsafeWebsiteId);
    }

    for domain in &umami.domains {
        if !is_attribute_safe(domain) {
            errors.push(ValidationError::UnsafeDomain(domain.clone()));
        }
    }

    if umami.forward_prefix().is_empty() {
        errors.push(ValidationError::EmptyForwardPath);
    }

    if umami.anchor.is_empty() {
        errors.push(ValidationError::EmptyAnchor);
    }

    let ranges: [(&'static str, u64); 7] = [
        ("umami.max_capture_bytes", umami.max_capture_bytes as u64),
        ("tracking.queue_capacity", config.tracking.queue_capacity as u64),
        ("tracking.max_in_flight", config.tracking.max_in_flight as u64),
        ("tracking.drain_timeout_secs", config.tracking.drain_timeout_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
    ];
    for (name, value) in ranges {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Characters that can sit inside a quoted attribute and a JS string literal.
fn is_attribute_safe(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.umami.umami_host = "http://umami:3000".into();
        config.umami.website_id = "1f5ab2c3-0000-4000-8000-000000000000".into();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_default_config_reports_all_missing_fields() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingUmamiHost));
        assert!(errors.contains(&ValidationError::MissingWebsiteId));
    }

    #[test]
    fn test_rejects_non_http_host() {
        let mut config = valid_config();
        config.umami.umami_host = "ftp://umami".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidUmamiHost(_)));
    }

    #[test]
    fn test_rejects_quotes_in_embedded_values() {
        let mut config = valid_config();
        config.umami.website_id = "x' onload='alert(1)".into();
        config.umami.domains = vec!["example.com".into(), "a'b".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::UnsafeWebsiteId,
                ValidationError::UnsafeDomain("a'b".into()),
            ]
        );
    }

    #[test]
    fn test_rejects_zero_ranges() {
        let mut config = valid_config();
        config.umami.forward_path = "//".into();
        config.tracking.queue_capacity = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyForwardPath));
        assert!(errors.contains(&ValidationError::Zero("tracking.queue_capacity")));
    }
}
