//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing backend groups)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - The webhook cluster is not checked here: an unknown cluster only
//!   disables delivery and is reported when a delivery is attempted

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener bind address '{0}' is not a socket address")]
    BindAddress(String),
    #[error("backend '{name}' has invalid address '{address}'")]
    BackendAddress { name: String, address: String },
    #[error("backend '{0}' has a zero connection limit")]
    ZeroConnections(String),
    #[error("route '{route}' references unknown backend group '{group}'")]
    UnknownGroup { route: String, group: String },
    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let mut groups = HashSet::new();
    for backend in &config.backends {
        if backend.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::BackendAddress {
                name: backend.name.clone(),
                address: backend.address.clone(),
            });
        }
        if backend.max_connections == 0 {
            errors.push(ValidationError::ZeroConnections(backend.name.clone()));
        }
        groups.insert(backend.group.as_str());
    }

    for route in &config.routes {
        if !groups.contains(route.backend_group.as_str()) {
            errors.push(ValidationError::UnknownGroup {
                route: route.name.clone(),
                group: route.backend_group.clone(),
            });
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect"));
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
    use crate::config::{BackendConfig, RouteConfig};

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig {
            name: "b1".into(),
            group: "web".into(),
            address: "127.0.0.1:3000".into(),
            ..Default::default()
        });
        config.routes.push(RouteConfig {
            name: "r1".into(),
            backend_group: "web".into(),
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_bad_backend() {
        let mut config = valid();
        config.backends[0].address = "localhost".into();
        config.backends[0].max_connections = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BackendAddress {
                    name: "b1".into(),
                    address: "localhost".into()
                },
                ValidationError::ZeroConnections("b1".into()),
            ]
        );
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = valid();
        config.timeouts.request_secs = 0;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::ZeroTimeout("request")]
        );
    }
}
