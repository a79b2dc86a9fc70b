//! Built-in APIs.

pub mod health;

pub use health::{HealthApi, HealthApiFactory, HEALTH_BINDING};
