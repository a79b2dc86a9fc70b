//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum-server, hyper)
//!     → middleware/ (trace, compression, replacement address, panic containment)
//!     → context.rs (ServerContext attached to the request)
//!     → routing::Dispatcher (handler selection)
//!     → Send to client
//! ```

pub mod context;
pub mod middleware;
pub mod server;

pub use context::{selected_handler, ServerContext};
pub use middleware::{PanicHook, PanicReport, REPLACEMENT_ADDRESS_HEADER};
pub use server::{BuildContext, ListenerOutcome, ListenerReport, Server, ServerError, ShutdownReport};
