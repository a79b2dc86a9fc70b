//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! BindPointConfig
//!     → bind_point.rs (factory lookup, address and identity checks)
//!     → tls.rs (identity → rustls ServerConfig)
//!     → listener.rs (socket bound at build time)
//!     → Hand off to the HTTP layer at start
//!     → connection.rs (idle deadline on every accepted stream)
//! ```
//!
//! # Design Decisions
//! - Address conflicts surface while building, not while serving
//! - TLS requires an identity or an explicit plaintext opt-in, and is handled
//!   by the HTTP server acceptor

pub mod bind_point;
pub mod connection;
pub mod listener;
pub mod tls;

pub use bind_point::{
    BindPoint, BindPointError, BindPointFactory, BindPointRegistry, TcpBindPoint, TcpBindPointFactory, TCP_BINDING,
};
pub use connection::{IdleTimeoutAcceptor, IdleTimeoutStream};
pub use listener::{BoundListener, ListenerError};
pub use tls::{Identity, IdentityError};
