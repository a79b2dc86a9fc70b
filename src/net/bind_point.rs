//! Bind points: the physical listeners of a logical server.
//!
//! # Responsibilities
//! - Produce the bound listener for one interface address
//! - Offer hooks around the request pipeline of that listener
//! - Check that the TLS identity covers the advertised addresses
//!
//! # Design Decisions
//! - Factories live in an explicit [`BindPointRegistry`] owned by the instance
//! - The first factory that handles a config wins
//! - Registering a binding twice is ignored with a warning

use std::fmt;
use std::sync::Arc;

use axum::Router;

use crate::config::{validate_host_port, validate_interface, AddressError, BindPointConfig};
use crate::net::listener::{BoundListener, ListenerError};
use crate::net::tls::Identity;

/// Binding of the built-in TCP bind point.
pub const TCP_BINDING: &str = "tcp";

#[derive(Debug, thiserror::Error)]
pub enum BindPointError {
    #[error("no bind point factory handles kind [{kind}] for interface [{interface}]")]
    NoFactory { kind: String, interface: String },
    #[error("invalid {field} address [{address}]: {reason}")]
    InvalidAddress {
        field: &'static str,
        address: String,
        reason: AddressError,
    },
    #[error("identity is not valid for {field} address [{address}], certificate names: {names:?}")]
    IdentityMismatch {
        field: &'static str,
        address: String,
        names: Vec<String>,
    },
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// One physical listener of a logical server.
pub trait BindPoint: Send + Sync + fmt::Debug {
    /// Bind the listener for `server_name`, serving TLS when `tls` is set.
    fn listener(
        &self,
        server_name: &str,
        tls: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<BoundListener, BindPointError>;

    /// Wraps the pipeline before the server's handlers run.
    fn before_handler(&self, next: Router) -> Router {
        next
    }

    /// Wraps the pipeline after the server's handlers and middleware.
    fn after_handler(&self, prev: Router) -> Router {
        prev
    }

    /// Every problem found with this bind point and the identity it will serve.
    fn validate(&self, identity: Option<&Identity>) -> Vec<BindPointError>;

    /// Advertised `host:port` of this bind point.
    fn server_address(&self) -> &str;

    /// Interface `host:port` the listener binds.
    fn interface_address(&self) -> &str;

    /// Replacement address announced to clients, if any.
    fn new_address(&self) -> Option<&str>;
}

/// Creates bind points from configuration.
pub trait BindPointFactory: Send + Sync + fmt::Debug {
    fn binding(&self) -> &str;

    /// Whether this factory builds bind points for `config`.
    fn handles(&self, config: &BindPointConfig) -> bool;

    fn new_bind_point(&self, config: &BindPointConfig) -> Result<Box<dyn BindPoint>, BindPointError>;
}

/// Plain TCP bind point, optionally serving TLS.
#[derive(Debug, Clone)]
pub struct TcpBindPoint {
    config: BindPointConfig,
}

impl TcpBindPoint {
    pub fn new(config: BindPointConfig) -> Self {
        Self { config }
    }
}

impl BindPoint for TcpBindPoint {
    fn listener(
        &self,
        server_name: &str,
        tls: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<BoundListener, BindPointError> {
        tracing::debug!(
            server = %server_name,
            interface = %self.config.interface,
            address = %self.config.address,
            "Acquiring listener"
        );
        Ok(BoundListener::bind(&self.config.interface, tls)?)
    }

    fn validate(&self, identity: Option<&Identity>) -> Vec<BindPointError> {
        let mut errors = Vec::new();

        if let Err(reason) = validate_interface(&self.config.interface) {
            errors.push(BindPointError::InvalidAddress {
                field: "interface",
                address: self.config.interface.clone(),
                reason,
            });
        }

        let mut addresses = vec![("advertise", self.config.address.as_str())];
        if let Some(new_address) = self.new_address() {
            addresses.push(("new", new_address));
        }

        for &(field, address) in &addresses {
            if let Err(reason) = validate_host_port(address) {
                errors.push(BindPointError::InvalidAddress {
                    field,
                    address: address.to_string(),
                    reason,
                });
            }
        }

        if let Some(identity) = identity {
            for &(field, address) in &addresses {
                if !identity.valid_for(address) {
                    errors.push(BindPointError::IdentityMismatch {
                        field,
                        address: address.to_string(),
                        names: identity.dns_names().to_vec(),
                    });
                }
            }
        }

        errors
    }

    fn server_address(&self) -> &str {
        &self.config.address
    }

    fn interface_address(&self) -> &str {
        &self.config.interface
    }

    fn new_address(&self) -> Option<&str> {
        self.config.new_address.as_deref().filter(|address| !address.trim().is_empty())
    }
}

/// Factory for [`TcpBindPoint`], handles kind `tcp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBindPointFactory;

impl BindPointFactory for TcpBindPointFactory {
    fn binding(&self) -> &str {
        TCP_BINDING
    }

    fn handles(&self, config: &BindPointConfig) -> bool {
        config.kind.eq_ignore_ascii_case(TCP_BINDING)
    }

    fn new_bind_point(&self, config: &BindPointConfig) -> Result<Box<dyn BindPoint>, BindPointError> {
        Ok(Box::new(TcpBindPoint::new(config.clone())))
    }
}

/// Ordered set of bind point factories.
#[derive(Debug)]
pub struct BindPointRegistry {
    factories: Vec<Box<dyn BindPointFactory>>,
}

impl BindPointRegistry {
    /// A registry without any factory.
    pub fn empty() -> Self {
        Self { factories: Vec::new() }
    }

    pub fn register(&mut self, factory: Box<dyn BindPointFactory>) {
        if self.factories.iter().any(|existing| existing.binding() == factory.binding()) {
            tracing::warn!(binding = %factory.binding(), "Ignoring bind point factory already registered");
            return;
        }
        self.factories.push(factory);
    }

    pub fn find(&self, config: &BindPointConfig) -> Result<&dyn BindPointFactory, BindPointError> {
        self.factories
            .iter()
            .find(|factory| factory.handles(config))
            .map(|factory| factory.as_ref())
            .ok_or_else(|| BindPointError::NoFactory {
                kind: config.kind.clone(),
                interface: config.interface.clone(),
            })
    }

    pub fn new_bind_point(&self, config: &BindPointConfig) -> Result<Box<dyn BindPoint>, BindPointError> {
        self.find(config)?.new_bind_point(config)
    }

    pub fn bindings(&self) -> Vec<&str> {
        self.factories.iter().map(|factory| factory.binding()).collect()
    }
}

impl Default for BindPointRegistry {
    /// A registry holding the TCP factory.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(TcpBindPointFactory));
        registry
    }
}
