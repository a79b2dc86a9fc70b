//! Test doubles shared by the unit tests of this crate.

use axum::body::Body;
use axum::http::Request;
use axum::Router;

use crate::config::ApiOptions;
use crate::routing::ApiHandler;

/// Answers `200` with its binding name as the body.
#[derive(Debug, Clone)]
pub struct MockApi {
    binding: String,
    root: String,
    accept_all: bool,
    options: ApiOptions,
}

impl MockApi {
    pub fn new(binding: &str) -> Self {
        Self {
            binding: binding.to_string(),
            root: format!("/{binding}"),
            accept_all: false,
            options: ApiOptions::new(),
        }
    }

    pub fn root(mut self, root: &str) -> Self {
        self.root = root.to_string();
        self
    }

    pub fn accept_all(mut self) -> Self {
        self.accept_all = true;
        self
    }
}

impl ApiHandler for MockApi {
    fn binding(&self) -> &str {
        &self.binding
    }

    fn options(&self) -> &ApiOptions {
        &self.options
    }

    fn root_path(&self) -> &str {
        &self.root
    }

    /// Accepts everything when built with `accept_all`, otherwise only
    /// requests whose `x-api` header names this binding.
    fn is_handler(&self, request: &Request<Body>) -> bool {
        self.accept_all
            || request
                .headers()
                .get("x-api")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == self.binding)
    }

    fn router(&self) -> Router {
        let binding = self.binding.clone();
        Router::new().fallback(move || {
            let binding = binding.clone();
            async move { binding }
        })
    }
}
