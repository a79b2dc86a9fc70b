//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Build (instance.rs):
//!     InstanceConfig → interface collision check → Server per config → mutators
//!
//! Start (instance.rs):
//!     every Server → one task per listener
//!
//! Shutdown (instance.rs, shutdown.rs):
//!     Signal received → one task per server → graceful drain (15s) → ShutdownWaiter
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then servers, then listeners
//! - Any build error is fatal; start errors are per server
//! - Shutdown has a deadline: listeners still busy are abandoned

pub mod instance;
pub mod shutdown;
pub mod signals;

pub use instance::{Instance, InstanceError, ServerMutator, SHUTDOWN_GRACE};
pub use shutdown::ShutdownWaiter;
pub use signals::shutdown_signal;
