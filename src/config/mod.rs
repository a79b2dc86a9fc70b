//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks against the API registry)
//!     → InstanceConfig (validated, immutable)
//!     → shared via Arc with every logical server and request context
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All optional fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ApiConfig, ApiOptions, BindPointConfig, ClientAuthPolicy, DemuxStrategy, IdentityConfig, InstanceConfig,
    LogFormat, LoggingConfig, ServerConfig, ServerOptions, TlsVersion,
};
pub use validation::{validate_config, validate_host_port, validate_interface, AddressError, ValidationError};
