//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros (structured log events)
//!     → logging.rs (subscriber: EnvFilter + fmt layer)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event, never interpolated messages
//! - `RUST_LOG` wins over the configured level

pub mod logging;

pub use logging::init_logging;
