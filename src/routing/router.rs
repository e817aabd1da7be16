//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for a request (host exact, path prefix)
//! - Return the matched backend target or explicit no-match

use std::net::SocketAddr;

use crate::config::ProxyConfig;

/// A resolved backend endpoint.
#[derive(Debug, Clone)]
pub struct Target {
    /// Backend name, for logs and metrics.
    pub name: String,
    /// Dial address.
    pub addr: SocketAddr,
    /// Value the forwarder supplies as `Host`.
    pub authority: String,
}

#[derive(Debug)]
struct CompiledRoute {
    host: Option<String>,
    path_prefix: Option<String>,
    target: Target,
}

/// Immutable, priority-ordered router.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    /// Compile the configured routes. Assumes the config passed semantic
    /// validation; unparsable backend addresses still surface as errors.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, std::net::AddrParseError> {
        let mut ordered: Vec<&crate::config::RouteConfig> = config.routes.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut routes = Vec::with_capacity(ordered.len());
        for route in ordered {
            let Some(backend) = config.backends.iter().find(|b| b.name == route.backend) else {
                continue;
            };
            let addr: SocketAddr = backend.address.parse()?;
            routes.push(CompiledRoute {
                host: route.host.as_ref().map(|h| h.to_ascii_lowercase()),
                path_prefix: route.path_prefix.clone(),
                target: Target {
                    name: backend.name.clone(),
                    addr,
                    authority: backend
                        .host_header
                        .clone()
                        .unwrap_or_else(|| backend.address.clone()),
                },
            });
        }
        Ok(Self { routes })
    }

    /// First route matching `host` and `path`, highest priority first.
    pub fn route(&self, host: Option<&str>, path: &str) -> Option<&Target> {
        self.routes
            .iter()
            .find(|route| host_matches(route.host.as_deref(), host) && prefix_matches(route.path_prefix.as_deref(), path))
            .map(|route| &route.target)
    }
}

fn host_matches(expected: Option<&str>, actual: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(actual) = actual else {
        return false;
    };
    let actual = actual.to_ascii_lowercase();
    // Accept the host with or without an explicit port.
    actual == expected
        || actual
            .rsplit_once(':')
            .map(|(bare, _)| bare == expected)
            .unwrap_or(false)
}

fn prefix_matches(expected: Option<&str>, path: &str) -> bool {
    expected.map(|prefix| path.starts_with(prefix)).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, RouteConfig};

    fn config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig {
            name: "api".into(),
            address: "127.0.0.1:9001".into(),
            host_header: Some("api.internal".into()),
        });
        config.backends.push(BackendConfig {
            name: "web".into(),
            address: "127.0.0.1:9002".into(),
            host_header: None,
        });
        config.routes.push(RouteConfig {
            name: "api".into(),
            host: Some("Api.Example.Test".into()),
            path_prefix: Some("/api".into()),
            backend: "api".into(),
            priority: 10,
        });
        config.routes.push(RouteConfig {
            name: "catch-all".into(),
            host: None,
            path_prefix: Some("/".into()),
            backend: "web".into(),
            priority: 0,
        });
        config
    }

    #[test]
    fn priority_and_host_matching() {
        let router = Router::from_config(&config()).unwrap();

        let target = router.route(Some("api.example.test"), "/api/v1").unwrap();
        assert_eq!(target.name, "api");
        assert_eq!(target.authority, "api.internal");

        // Port on the host header does not defeat the match.
        let target = router.route(Some("api.example.test:8080"), "/api").unwrap();
        assert_eq!(target.name, "api");

        let target = router.route(Some("other.test"), "/api").unwrap();
        assert_eq!(target.name, "web");
        assert_eq!(target.authority, "127.0.0.1:9002");
    }

    #[test]
    fn no_match_is_explicit() {
        let mut config = config();
        config.routes.retain(|r| r.name == "api");
        let router = Router::from_config(&config).unwrap();
        assert!(router.route(Some("other.test"), "/x").is_none());
    }
}
