//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use apimux::apis::HealthApiFactory;
use apimux::config::{ApiConfig, ApiOptions, BindPointConfig, InstanceConfig, ServerConfig};
use apimux::{ApiHandler, ApiHandlerFactory, BoxError, Handler, Instance, Registry, RegistryMap};
use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;

/// Answers `200` with its binding name under its root path, an empty `404`
/// anywhere else.
#[derive(Debug, Clone)]
pub struct EchoApi {
    binding: String,
    root: String,
    options: ApiOptions,
}

impl ApiHandler for EchoApi {
    fn binding(&self) -> &str {
        &self.binding
    }

    fn options(&self) -> &ApiOptions {
        &self.options
    }

    fn root_path(&self) -> &str {
        &self.root
    }

    fn is_handler(&self, request: &Request<Body>) -> bool {
        request.uri().path().starts_with(&self.root)
    }

    fn router(&self) -> Router {
        let binding = self.binding.clone();
        let reply = move || {
            let binding = binding.clone();
            async move { binding }
        };

        Router::new()
            .route(&self.root, get(reply.clone()))
            .route(&format!("{}/{{*rest}}", self.root), get(reply))
    }
}

/// Panics on every request.
#[derive(Debug, Clone)]
pub struct PanickingApi {
    options: ApiOptions,
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

impl ApiHandler for PanickingApi {
    fn binding(&self) -> &str {
        "panic"
    }

    fn options(&self) -> &ApiOptions {
        &self.options
    }

    fn root_path(&self) -> &str {
        "/panic"
    }

    fn is_handler(&self, request: &Request<Body>) -> bool {
        request.uri().path().starts_with("/panic")
    }

    fn router(&self) -> Router {
        Router::new().fallback(explode)
    }
}

/// Answers `/slow` after [`SLOW_REPLY`].
#[derive(Debug, Clone)]
pub struct SlowApi {
    options: ApiOptions,
}

pub const SLOW_REPLY: Duration = Duration::from_secs(5);

impl ApiHandler for SlowApi {
    fn binding(&self) -> &str {
        "slow"
    }

    fn options(&self) -> &ApiOptions {
        &self.options
    }

    fn root_path(&self) -> &str {
        "/slow"
    }

    fn is_handler(&self, request: &Request<Body>) -> bool {
        request.uri().path().starts_with("/slow")
    }

    fn router(&self) -> Router {
        Router::new().fallback(|| async {
            tokio::time::sleep(SLOW_REPLY).await;
            "slow"
        })
    }
}

/// Builds an [`EchoApi`] whose root comes from the `root_path` option.
#[derive(Debug)]
pub struct EchoFactory(pub &'static str);

impl ApiHandlerFactory for EchoFactory {
    fn binding(&self) -> &str {
        self.0
    }

    fn new_handler(&self, _: &ServerConfig, options: &ApiOptions) -> Result<Handler, BoxError> {
        let root = options
            .get("root_path")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("/{}", self.0));

        Ok(Handler::new(EchoApi {
            binding: self.0.to_string(),
            root,
            options: options.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct PanickingFactory;

impl ApiHandlerFactory for PanickingFactory {
    fn binding(&self) -> &str {
        "panic"
    }

    fn new_handler(&self, _: &ServerConfig, options: &ApiOptions) -> Result<Handler, BoxError> {
        Ok(Handler::new(PanickingApi {
            options: options.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct SlowFactory;

impl ApiHandlerFactory for SlowFactory {
    fn binding(&self) -> &str {
        "slow"
    }

    fn new_handler(&self, _: &ServerConfig, options: &ApiOptions) -> Result<Handler, BoxError> {
        Ok(Handler::new(SlowApi {
            options: options.clone(),
        }))
    }
}

/// Registry holding `mock`, `other`, `panic`, `slow` and `health`.
pub fn registry() -> RegistryMap {
    let mut registry = RegistryMap::new();
    registry.add(Box::new(EchoFactory("mock"))).unwrap();
    registry.add(Box::new(EchoFactory("other"))).unwrap();
    registry.add(Box::new(PanickingFactory)).unwrap();
    registry.add(Box::new(SlowFactory)).unwrap();
    registry.add(Box::new(HealthApiFactory)).unwrap();
    registry
}

/// A server hosting only `mock` at `/mock`, on one ephemeral plaintext bind
/// point per entry of `new_addresses`.
pub fn mock_server(name: &str, new_addresses: &[Option<&str>]) -> ServerConfig {
    with_bind_points(
        ServerConfig::new(name).with_api(ApiConfig::new("mock").with_option("root_path", "/mock")),
        new_addresses,
    )
}

/// A server hosting `mock` at `/mock`, `panic` at `/panic` and `other` at
/// `/other`, declared default, on one ephemeral bind point per entry of
/// `new_addresses`.
pub fn server_config(name: &str, new_addresses: &[Option<&str>]) -> ServerConfig {
    let server = ServerConfig::new(name)
        .with_api(ApiConfig::new("mock").with_option("root_path", "/mock"))
        .with_api(ApiConfig::new("panic"))
        .with_api(ApiConfig::new("other").as_default());
    with_bind_points(server, new_addresses)
}

pub fn with_bind_points(mut server: ServerConfig, new_addresses: &[Option<&str>]) -> ServerConfig {
    for new_address in new_addresses {
        let mut bind_point = BindPointConfig::new("127.0.0.1:0", "localhost:8443").as_plaintext();
        if let Some(new_address) = new_address {
            bind_point = bind_point.with_new_address(*new_address);
        }
        server = server.with_bind_point(bind_point);
    }
    server
}

pub fn instance_config(servers: Vec<ServerConfig>) -> InstanceConfig {
    InstanceConfig {
        servers,
        ..Default::default()
    }
}

/// Build and start an instance with a short shutdown grace.
pub fn start_instance(config: InstanceConfig) -> Instance {
    let mut instance = Instance::new(config, registry()).with_shutdown_grace(Duration::from_secs(5));
    instance.run().unwrap();
    instance
}

/// A client that keeps no idle connections, so shutdowns drain quickly.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}
