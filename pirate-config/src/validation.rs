//! Configuration validation traits and utilities

use std::net::SocketAddr;

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate a `host:port` endpoint
///
/// Hostnames are accepted as long as they carry a numeric port; literal
/// socket addresses on a reserved port only produce a warning.
pub fn validate_endpoint(endpoint: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(endpoint, field_name, domain)?;

    if let Ok(addr) = endpoint.parse::<SocketAddr>() {
        if addr.port() != 0 && addr.port() <= 1023 {
            log::warn!("{} port {} is in the reserved range (1-1023)", field_name, addr.port());
        }
        return Ok(());
    }

    let port = endpoint
        .rsplit_once(':')
        .filter(|(host, _)| !host.is_empty())
        .and_then(|(_, port)| port.parse::<u16>().ok());

    match port {
        Some(_) => Ok(()),
        None => Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be host:port, got '{}'", field_name, endpoint),
        }),
    }
}
