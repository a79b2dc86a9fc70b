//! Health API: reports that a server is up and where a request landed.
//!
//! Options:
//! - `root_path` (string, default `/health`): path the API answers on

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::config::{ApiOptions, InstanceConfig, ServerConfig};
use crate::http::ServerContext;
use crate::registry::ApiHandlerFactory;
use crate::routing::{ApiHandler, Handler};
use crate::BoxError;

pub const HEALTH_BINDING: &str = "health";

const DEFAULT_ROOT_PATH: &str = "/health";

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub server: Option<String>,
    pub address: Option<String>,
}

async fn get_status(request: Request<Body>) -> Json<HealthStatus> {
    let context = ServerContext::from_request(&request);
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        server: context.map(|ctx| ctx.server().name.clone()),
        address: context.map(|ctx| ctx.bind_point().address.clone()),
    })
}

fn root_path(options: &ApiOptions) -> Result<String, BoxError> {
    match options.get("root_path") {
        None => Ok(DEFAULT_ROOT_PATH.to_string()),
        Some(toml::Value::String(path)) if path.starts_with('/') => Ok(path.clone()),
        Some(other) => Err(format!("root_path must be a string starting with '/', got {other}").into()),
    }
}

/// Handler of the `health` binding.
#[derive(Debug, Clone)]
pub struct HealthApi {
    options: ApiOptions,
    root_path: String,
}

impl HealthApi {
    pub fn new(options: ApiOptions) -> Result<Self, BoxError> {
        let root_path = root_path(&options)?;
        Ok(Self { options, root_path })
    }
}

impl ApiHandler for HealthApi {
    fn binding(&self) -> &str {
        HEALTH_BINDING
    }

    fn options(&self) -> &ApiOptions {
        &self.options
    }

    fn root_path(&self) -> &str {
        &self.root_path
    }

    fn is_handler(&self, request: &Request<Body>) -> bool {
        let path = request.uri().path();
        path == self.root_path || path.strip_prefix(self.root_path.as_str()).is_some_and(|rest| rest.starts_with('/'))
    }

    fn router(&self) -> Router {
        Router::new().route(&self.root_path, get(get_status))
    }
}

/// Factory registered under [`HEALTH_BINDING`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthApiFactory;

impl ApiHandlerFactory for HealthApiFactory {
    fn binding(&self) -> &str {
        HEALTH_BINDING
    }

    fn new_handler(&self, server: &ServerConfig, options: &ApiOptions) -> Result<Handler, BoxError> {
        let api = HealthApi::new(options.clone())?;
        tracing::debug!(server = %server.name, root_path = %api.root_path, "Health API built");
        Ok(Handler::new(api))
    }

    fn validate(&self, config: &InstanceConfig) -> Result<(), BoxError> {
        for server in &config.servers {
            for api in server.apis.iter().filter(|api| api.binding == HEALTH_BINDING) {
                root_path(&api.options).map_err(|e| format!("server [{}]: {e}", server.name))?;
            }
        }
        Ok(())
    }
}
