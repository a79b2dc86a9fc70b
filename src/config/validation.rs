//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (APIs reference registered factories)
//! - Validate value ranges (timeouts > 0, ports valid, TLS bounds ordered)
//! - Detect bind points colliding on the same interface
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config and the registry
//! - Runs before the instance is built

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::config::schema::{InstanceConfig, ServerConfig, TlsVersion};
use crate::registry::Registry;

/// Why a `host:port` string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("must not be an empty string or unspecified")]
    Empty,
    #[error("could not split host and port: {0}")]
    Split(&'static str),
    #[error("host must be specified")]
    MissingHost,
    #[error("port must be specified")]
    MissingPort,
    #[error("invalid port, must be an integer")]
    InvalidPort,
    #[error("invalid port {0}, must be 1-65535")]
    PortOutOfRange(i64),
}

/// A single semantic problem in an instance configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("server at index [{index}] has an empty name")]
    EmptyServerName { index: usize },
    #[error("server name [{0}] is used more than once")]
    DuplicateServerName(String),
    #[error("server [{server}] declares no APIs, must declare at least one")]
    NoApis { server: String },
    #[error("server [{server}] api at index [{index}] has an empty binding")]
    EmptyBinding { server: String, index: usize },
    #[error("server [{server}] api at index [{index}] references unknown binding [{binding}]")]
    UnknownBinding {
        server: String,
        index: usize,
        binding: String,
    },
    #[error("server [{server}] declares no bind points, must declare at least one")]
    NoBindPoints { server: String },
    #[error("server [{server}] bind point at index [{index}] has an invalid {field} address [{address}]: {reason}")]
    InvalidAddress {
        server: String,
        index: usize,
        field: &'static str,
        address: String,
        reason: AddressError,
    },
    #[error("interface [{interface}] is bound by both server [{first}] and server [{second}]")]
    DuplicateInterface {
        interface: String,
        first: String,
        second: String,
    },
    #[error(
        "server [{server}] bind point at index [{index}] has no identity and no server or default identity is configured, set one or mark it plaintext"
    )]
    NoIdentity { server: String, index: usize },
    #[error("server [{server}] {field} must be positive")]
    ZeroTimeout { server: String, field: &'static str },
    #[error("server [{server}] min TLS version [{min}] must be less than or equal to max TLS version [{max}]")]
    TlsVersionRange {
        server: String,
        min: TlsVersion,
        max: TlsVersion,
    },
    #[error("api binding [{binding}] rejected the configuration: {message}")]
    Api { binding: String, message: String },
}

/// Validate a `host:port` address. The port must be in 1..=65535.
pub fn validate_host_port(address: &str) -> Result<(), AddressError> {
    check_host_port(address, false)
}

/// Validate an interface address to bind. Port 0 asks for an ephemeral port.
pub fn validate_interface(address: &str) -> Result<(), AddressError> {
    check_host_port(address, true)
}

fn check_host_port(address: &str, allow_ephemeral: bool) -> Result<(), AddressError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    let (host, port) = split_host_port(address)?;
    if host.is_empty() {
        return Err(AddressError::MissingHost);
    }
    if port.is_empty() {
        return Err(AddressError::MissingPort);
    }

    let port: i64 = port.parse().map_err(|_| AddressError::InvalidPort)?;
    if allow_ephemeral && port == 0 {
        return Ok(());
    }
    if !(1..=65535).contains(&port) {
        return Err(AddressError::PortOutOfRange(port));
    }

    Ok(())
}

/// Split `host:port` or `[ipv6]:port`.
fn split_host_port(address: &str) -> Result<(&str, &str), AddressError> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or(AddressError::Split("missing ']' in address"))?;
        let port = tail
            .strip_prefix(':')
            .ok_or(AddressError::Split("missing port in address"))?;
        return Ok((host, port));
    }

    let (host, port) = address
        .rsplit_once(':')
        .ok_or(AddressError::Split("missing port in address"))?;
    if host.contains(':') {
        return Err(AddressError::Split("too many colons in address"));
    }
    Ok((host, port))
}

/// Canonical form of an interface address for collision checks.
///
/// Returns `None` for ephemeral (`:0`) interfaces, which never collide.
pub fn interface_key(interface: &str) -> Option<String> {
    let interface = interface.trim();
    match interface.parse::<SocketAddr>() {
        Ok(addr) if addr.port() == 0 => None,
        Ok(addr) => Some(addr.to_string()),
        Err(_) if interface.ends_with(":0") => None,
        Err(_) => Some(interface.to_ascii_lowercase()),
    }
}

/// Every pair of bind points (across all servers) that share an interface.
pub fn interface_collisions(servers: &[ServerConfig]) -> Vec<ValidationError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut errors = Vec::new();

    for server in servers {
        for bind_point in &server.bind_points {
            let Some(key) = interface_key(&bind_point.interface) else {
                continue;
            };
            if let Some(first) = seen.get(&key) {
                errors.push(ValidationError::DuplicateInterface {
                    interface: key,
                    first: first.to_string(),
                    second: server.name.clone(),
                });
            } else {
                seen.insert(key, &server.name);
            }
        }
    }

    errors
}

fn validate_server(
    index: usize,
    server: &ServerConfig,
    registry: &dyn Registry,
    default_identity: bool,
    errors: &mut Vec<ValidationError>,
) {
    if server.name.trim().is_empty() {
        errors.push(ValidationError::EmptyServerName { index });
    }
    let name = server.name.clone();

    if server.apis.is_empty() {
        errors.push(ValidationError::NoApis { server: name.clone() });
    }
    for (index, api) in server.apis.iter().enumerate() {
        if api.binding.trim().is_empty() {
            errors.push(ValidationError::EmptyBinding {
                server: name.clone(),
                index,
            });
        } else if registry.get(&api.binding).is_none() {
            errors.push(ValidationError::UnknownBinding {
                server: name.clone(),
                index,
                binding: api.binding.clone(),
            });
        }
    }

    if server.bind_points.is_empty() {
        errors.push(ValidationError::NoBindPoints { server: name.clone() });
    }
    for (index, bind_point) in server.bind_points.iter().enumerate() {
        let mut check = |field: &'static str, address: &str| {
            let checked = if field == "interface" {
                validate_interface(address)
            } else {
                validate_host_port(address)
            };
            if let Err(reason) = checked {
                errors.push(ValidationError::InvalidAddress {
                    server: name.clone(),
                    index,
                    field,
                    address: address.to_string(),
                    reason,
                });
            }
        };
        check("interface", &bind_point.interface);
        check("advertise", &bind_point.address);
        if let Some(new_address) = &bind_point.new_address {
            check("new", new_address);
        }

        let has_identity = bind_point.identity.is_some() || server.identity.is_some() || default_identity;
        if !has_identity && !bind_point.plaintext {
            errors.push(ValidationError::NoIdentity {
                server: name.clone(),
                index,
            });
        }
    }

    let options = &server.options;
    for (field, value) in [
        ("readTimeout", options.read_timeout_secs),
        ("writeTimeout", options.write_timeout_secs),
        ("idleTimeout", options.idle_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout {
                server: name.clone(),
                field,
            });
        }
    }

    if options.min_tls_version > options.max_tls_version {
        errors.push(ValidationError::TlsVersionRange {
            server: name,
            min: options.min_tls_version,
            max: options.max_tls_version,
        });
    }
}

/// Validate an instance configuration against the registry of API factories.
///
/// Factory level validation only runs once every structural check passed,
/// so factories can rely on a well formed configuration.
pub fn validate_config(config: &InstanceConfig, registry: &dyn Registry) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut names: HashMap<&str, usize> = HashMap::new();

    for (index, server) in config.servers.iter().enumerate() {
        validate_server(index, server, registry, config.identity.is_some(), &mut errors);

        let count = names.entry(server.name.as_str()).or_default();
        *count += 1;
        if *count == 2 {
            errors.push(ValidationError::DuplicateServerName(server.name.clone()));
        }
    }

    errors.extend(interface_collisions(&config.servers));

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut bindings: Vec<&str> = config
        .servers
        .iter()
        .flat_map(|server| server.apis.iter().map(|api| api.binding.as_str()))
        .collect();
    bindings.sort_unstable();
    bindings.dedup();

    for binding in bindings {
        if let Some(factory) = registry.get(binding) {
            if let Err(e) = factory.validate(config) {
                errors.push(ValidationError::Api {
                    binding: binding.to_string(),
                    message: e.to_string(),
                });
            }
        }
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
    use crate::config::schema::{ApiConfig, BindPointConfig, IdentityConfig};
    use crate::registry::{ApiHandlerFactory, RegistryMap};
    use crate::routing::Handler;
    use crate::BoxError;

    #[derive(Debug)]
    struct PickyFactory;

    impl ApiHandlerFactory for PickyFactory {
        fn binding(&self) -> &str {
            "picky"
        }

        fn new_handler(&self, _: &ServerConfig, _: &crate::config::ApiOptions) -> Result<Handler, BoxError> {
            Err("not used".into())
        }

        fn validate(&self, _: &InstanceConfig) -> Result<(), BoxError> {
            Err("picky does not like this".into())
        }
    }

    #[derive(Debug)]
    struct EasyFactory;

    impl ApiHandlerFactory for EasyFactory {
        fn binding(&self) -> &str {
            "easy"
        }

        fn new_handler(&self, _: &ServerConfig, _: &crate::config::ApiOptions) -> Result<Handler, BoxError> {
            Err("not used".into())
        }
    }

    fn registry() -> RegistryMap {
        let mut registry = RegistryMap::new();
        registry.add(Box::new(PickyFactory)).unwrap();
        registry.add(Box::new(EasyFactory)).unwrap();
        registry
    }

    fn server(name: &str, interface: &str) -> ServerConfig {
        ServerConfig::new(name)
            .with_api(ApiConfig::new("easy"))
            .with_bind_point(BindPointConfig::new(interface, "localhost:8443").as_plaintext())
    }

    #[test]
    fn host_port_rules() {
        assert!(validate_host_port("localhost:443").is_ok());
        assert!(validate_host_port("[::1]:8080").is_ok());
        assert!(validate_host_port(" 10.0.0.1:65535 ").is_ok());
        assert_eq!(validate_host_port(""), Err(AddressError::Empty));
        assert_eq!(validate_host_port(":443"), Err(AddressError::MissingHost));
        assert_eq!(validate_host_port("host:"), Err(AddressError::MissingPort));
        assert_eq!(validate_host_port("host:abc"), Err(AddressError::InvalidPort));
        assert_eq!(validate_host_port("host:0"), Err(AddressError::PortOutOfRange(0)));
        assert_eq!(validate_host_port("host:70000"), Err(AddressError::PortOutOfRange(70000)));
        assert!(matches!(validate_host_port("host"), Err(AddressError::Split(_))));
        assert!(matches!(validate_host_port("::1:80"), Err(AddressError::Split(_))));
        assert_eq!(validate_interface("127.0.0.1:0"), Ok(()));
        assert_eq!(validate_interface("127.0.0.1:-1"), Err(AddressError::PortOutOfRange(-1)));
    }

    #[test]
    fn valid_config_passes() {
        let config = InstanceConfig {
            servers: vec![server("a", "127.0.0.1:8443"), server("b", "127.0.0.1:9443")],
            ..Default::default()
        };
        assert_eq!(validate_config(&config, &registry()), Ok(()));
    }

    #[test]
    fn collects_every_structural_error() {
        let mut bad = ServerConfig::new("bad");
        bad.options.read_timeout_secs = 0;
        bad.options.min_tls_version = TlsVersion::Tls13;
        bad.options.max_tls_version = TlsVersion::Tls12;
        let bad = bad
            .with_api(ApiConfig::new("missing"))
            .with_api(ApiConfig::new(""))
            .with_bind_point(BindPointConfig::new("127.0.0.1:8443", "nope").with_new_address("also:bad:port"));

        let config = InstanceConfig {
            servers: vec![bad, ServerConfig::new("")],
            ..Default::default()
        };
        let errors = validate_config(&config, &registry()).unwrap_err();

        assert!(errors.contains(&ValidationError::UnknownBinding {
            server: "bad".into(),
            index: 0,
            binding: "missing".into(),
        }));
        assert!(errors.contains(&ValidationError::EmptyBinding { server: "bad".into(), index: 1 }));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidAddress { field: "advertise", .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidAddress { field: "new", .. })));
        assert!(errors.contains(&ValidationError::ZeroTimeout {
            server: "bad".into(),
            field: "readTimeout",
        }));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::TlsVersionRange { .. })));
        assert!(errors.contains(&ValidationError::EmptyServerName { index: 1 }));
        assert!(errors.contains(&ValidationError::NoApis { server: String::new() }));
        assert!(errors.contains(&ValidationError::NoBindPoints { server: String::new() }));
    }

    #[test]
    fn bind_point_needs_an_identity_or_plaintext() {
        let bare = ServerConfig::new("bare")
            .with_api(ApiConfig::new("easy"))
            .with_bind_point(BindPointConfig::new("127.0.0.1:8443", "localhost:8443"));
        let identity = IdentityConfig {
            cert: "server.pem".into(),
            key: "server.key".into(),
            ca: None,
        };

        let mut config = InstanceConfig {
            servers: vec![bare],
            ..Default::default()
        };
        assert_eq!(
            validate_config(&config, &registry()).unwrap_err(),
            vec![ValidationError::NoIdentity {
                server: "bare".into(),
                index: 0,
            }]
        );

        config.servers[0].identity = Some(identity.clone());
        assert_eq!(validate_config(&config, &registry()), Ok(()));

        config.servers[0].identity = None;
        config.identity = Some(identity);
        assert_eq!(validate_config(&config, &registry()), Ok(()));

        config.identity = None;
        config.servers[0].bind_points[0].plaintext = true;
        assert_eq!(validate_config(&config, &registry()), Ok(()));
    }

    #[test]
    fn detects_duplicate_interfaces_and_names() {
        let config = InstanceConfig {
            servers: vec![
                server("a", "127.0.0.1:8443"),
                server("b", "127.0.0.1:8443"),
                server("a", "127.0.0.1:9000"),
            ],
            ..Default::default()
        };
        let errors = validate_config(&config, &registry()).unwrap_err();

        assert!(errors.contains(&ValidationError::DuplicateInterface {
            interface: "127.0.0.1:8443".into(),
            first: "a".into(),
            second: "b".into(),
        }));
        assert!(errors.contains(&ValidationError::DuplicateServerName("a".into())));
    }

    #[test]
    fn ephemeral_interfaces_never_collide() {
        let servers = vec![server("a", "127.0.0.1:0"), server("b", "127.0.0.1:0")];
        assert!(interface_collisions(&servers).is_empty());
        assert_eq!(interface_key("localhost:0"), None);
        assert_eq!(interface_key("LocalHost:80"), Some("localhost:80".to_string()));
    }

    #[test]
    fn factory_validation_runs_last() {
        let config = InstanceConfig {
            servers: vec![ServerConfig::new("p")
                .with_api(ApiConfig::new("picky"))
                .with_bind_point(BindPointConfig::new("127.0.0.1:8443", "localhost:8443").as_plaintext())],
            ..Default::default()
        };
        let errors = validate_config(&config, &registry()).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Api {
                binding: "picky".into(),
                message: "picky does not like this".into(),
            }]
        );
    }
}
