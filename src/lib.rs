//! Compose HTTP(S) bind points into logical servers.
//!
//! An [`Instance`] owns logical servers. Each server hosts an ordered set of
//! APIs, built by the factories of a [`Registry`], behind one
//! [`Dispatcher`](routing::Dispatcher), and serves them on any number of bind
//! points, each with its own interface, TLS identity and replacement address.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod registry;
pub mod routing;

// Built-in APIs
pub mod apis;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

/// Error type returned by API factories and server mutators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use config::InstanceConfig;
pub use http::{Server, REPLACEMENT_ADDRESS_HEADER};
pub use lifecycle::{Instance, ShutdownWaiter, SHUTDOWN_GRACE};
pub use registry::{ApiHandlerFactory, Registry, RegistryMap};
pub use routing::{ApiHandler, Handler};
