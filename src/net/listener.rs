//! Listener acquisition.
//!
//! # Responsibilities
//! - Bind the interface address of a bind point at build time
//! - Carry the TLS configuration the listener will serve with
//!
//! # Design Decisions
//! - Sockets are bound before `start`, so address conflicts fail the build
//! - Accepting only begins once the listener is handed to the HTTP server

use std::fmt;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {interface}: {source}")]
    Bind {
        interface: String,
        source: std::io::Error,
    },
    #[error("failed to configure listener on {interface}: {source}")]
    Configure {
        interface: String,
        source: std::io::Error,
    },
}

/// A bound, not yet accepting, TCP listener.
pub struct BoundListener {
    inner: TcpListener,
    local_addr: SocketAddr,
    tls: Option<Arc<rustls::ServerConfig>>,
}

impl BoundListener {
    /// Bind `interface` (`host:port`, port 0 picks an ephemeral port).
    pub fn bind(interface: &str, tls: Option<Arc<rustls::ServerConfig>>) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(interface.trim()).map_err(|source| ListenerError::Bind {
            interface: interface.to_string(),
            source,
        })?;

        let configure = |source: std::io::Error| ListenerError::Configure {
            interface: interface.to_string(),
            source,
        };
        inner.set_nonblocking(true).map_err(configure)?;
        let local_addr = inner.local_addr().map_err(configure)?;

        tracing::info!(
            interface = %interface,
            address = %local_addr,
            tls = tls.is_some(),
            "Listener bound"
        );

        Ok(Self { inner, local_addr, tls })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn into_parts(self) -> (TcpListener, Option<Arc<rustls::ServerConfig>>) {
        (self.inner, self.tls)
    }
}

impl fmt::Debug for BoundListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundListener")
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}
