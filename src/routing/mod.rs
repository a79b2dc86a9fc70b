//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request
//!     → demux.rs (Dispatcher)
//!     → matcher.rs (first handler accepting the request)
//!     → API-level default (resolved at build time)
//!     → fallback.rs (dispatcher → server → instance providers)
//!     → empty 404
//! ```
//!
//! # Design Decisions
//! - Dispatchers are built once per logical server, immutable at runtime
//! - Deterministic: same handlers and request always select the same handler
//! - First match wins (declaration order)

pub mod demux;
pub mod fallback;
pub mod handler;
pub mod matcher;

#[cfg(test)]
pub(crate) mod testing;

pub use demux::{
    resolve_default, DemuxError, DemuxFactory, Dispatcher, PathPrefixDemuxFactory,
    PredicateDemuxFactory,
};
pub use fallback::{not_found, DefaultHandlerProvider};
pub use handler::{ApiHandler, Handler, SelectedHandler};
pub use matcher::{Matcher, PathPrefixMatcher, PredicateMatcher};
