//! Per-request server context.
//!
//! Every request entering a bind point carries a [`ServerContext`] in its
//! extensions. Handlers extract it with `Extension<ServerContext>` or read it
//! through [`ServerContext::from_request`].

use std::sync::Arc;

use axum::http::Request;

use crate::config::{BindPointConfig, InstanceConfig, ServerConfig};
use crate::routing::SelectedHandler;

/// Configuration of the bind point, server and instance a request arrived on.
#[derive(Debug, Clone)]
pub struct ServerContext {
    bind_point: Arc<BindPointConfig>,
    server: Arc<ServerConfig>,
    instance: Arc<InstanceConfig>,
}

impl ServerContext {
    pub fn new(bind_point: Arc<BindPointConfig>, server: Arc<ServerConfig>, instance: Arc<InstanceConfig>) -> Self {
        Self {
            bind_point,
            server,
            instance,
        }
    }

    pub fn bind_point(&self) -> &BindPointConfig {
        &self.bind_point
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn instance(&self) -> &InstanceConfig {
        &self.instance
    }

    pub fn from_request<B>(request: &Request<B>) -> Option<&ServerContext> {
        request.extensions().get::<ServerContext>()
    }
}

/// The handler the dispatcher routed `request` to, once dispatched.
pub fn selected_handler<B>(request: &Request<B>) -> Option<&SelectedHandler> {
    request.extensions().get::<SelectedHandler>()
}
