//! API handler factory registry.
//!
//! # Responsibilities
//! - Map binding names to the factories that build their handlers
//! - Reject a second factory for an already registered binding
//!
//! # Design Decisions
//! - The registry is an explicit object handed to the instance (no globals)
//! - Factories are looked up by exact binding name

use std::collections::HashMap;
use std::fmt;

use crate::config::{ApiOptions, InstanceConfig, ServerConfig};
use crate::routing::Handler;
use crate::BoxError;

/// Builds the handlers for one binding.
pub trait ApiHandlerFactory: Send + Sync + fmt::Debug {
    /// Binding name this factory answers for.
    fn binding(&self) -> &str;

    /// Build the handler mounted on `server`, configured by `options`.
    fn new_handler(&self, server: &ServerConfig, options: &ApiOptions) -> Result<Handler, BoxError>;

    /// Check the whole instance configuration before anything is built.
    fn validate(&self, _config: &InstanceConfig) -> Result<(), BoxError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("binding [{0}] already has a registered factory")]
    DuplicateBinding(String),
}

/// Lookup of factories by binding name.
pub trait Registry: Send + Sync {
    fn add(&mut self, factory: Box<dyn ApiHandlerFactory>) -> Result<(), RegistryError>;

    fn get(&self, binding: &str) -> Option<&dyn ApiHandlerFactory>;
}

/// [`Registry`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct RegistryMap {
    factories: HashMap<String, Box<dyn ApiHandlerFactory>>,
}

impl RegistryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered binding names, sorted.
    pub fn bindings(&self) -> Vec<&str> {
        let mut bindings: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        bindings.sort_unstable();
        bindings
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Registry for RegistryMap {
    fn add(&mut self, factory: Box<dyn ApiHandlerFactory>) -> Result<(), RegistryError> {
        let binding = factory.binding().to_string();
        if self.factories.contains_key(&binding) {
            return Err(RegistryError::DuplicateBinding(binding));
        }

        tracing::debug!(binding = %binding, "Registered API handler factory");
        self.factories.insert(binding, factory);
        Ok(())
    }

    fn get(&self, binding: &str) -> Option<&dyn ApiHandlerFactory> {
        self.factories.get(binding).map(|factory| factory.as_ref())
    }
}
