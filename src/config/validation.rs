//! Configuration validation logic.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. Backend names must be unique and addresses must parse
    let mut backend_names: HashSet<&str> = HashSet::new();
    for backend in &config.backends {
        if !backend_names.insert(backend.name.as_str()) {
            errors.push(ValidationError(format!(
                "Duplicate backend name '{}'",
                backend.name
            )));
        }
        if backend.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError(format!(
                "Backend '{}' has unparsable address '{}'",
                backend.name, backend.address
            )));
        }
    }

    // 2. Referential integrity: routes must point to existing backends
    for route in &config.routes {
        if !backend_names.contains(route.backend.as_str()) {
            errors.push(ValidationError(format!(
                "Route '{}' references unknown backend '{}'",
                route.name, route.backend
            )));
        }
    }

    // 3. Limits
    if config.limits.max_header_bytes == 0 {
        errors.push(ValidationError(
            "limits.max_header_bytes must be > 0".to_string(),
        ));
    }

    // 4. Timeouts (basic check)
    if config.timeouts.connect_ms == 0 {
        tracing::warn!("timeouts.connect_ms is 0, backend connects will time out immediately");
    }
    if config.timeouts.continue_secs == 0 {
        errors.push(ValidationError(
            "timeouts.continue_secs must be > 0".to_string(),
        ));
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
    use crate::config::schema::*;

    #[test]
    fn test_valid_config() {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig {
            name: "b1".into(),
            address: "127.0.0.1:80".into(),
            host_header: None,
        });
        config.routes.push(RouteConfig {
            name: "r1".into(),
            host: None,
            path_prefix: Some("/".into()),
            backend: "b1".into(),
            priority: 0,
        });

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_backend() {
        let mut config = ProxyConfig::default();
        config.routes.push(RouteConfig {
            name: "r1".into(),
            host: None,
            path_prefix: Some("/".into()),
            backend: "missing".into(),
            priority: 0,
        });

        let errs = validate_config(&config).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].0.contains("unknown backend 'missing'"));
    }

    #[test]
    fn test_bad_address_and_duplicate_name() {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig {
            name: "b1".into(),
            address: "not-an-address".into(),
            host_header: None,
        });
        config.backends.push(BackendConfig {
            name: "b1".into(),
            address: "127.0.0.1:80".into(),
            host_header: None,
        });

        let errs = validate_config(&config).unwrap_err();
        assert_eq!(errs.len(), 2);
    }
}
