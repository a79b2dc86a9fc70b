//! Default handler resolution chain.
//!
//! Dispatcher, logical server and instance each own a
//! [`DefaultHandlerProvider`]. A provider answers with its own handler when
//! one is set and otherwise defers to its parent, ending in an empty
//! `404 Not Found`.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceExt;

/// Longest parent chain walked before giving up; guards against cycles.
const MAX_CHAIN_DEPTH: usize = 16;

/// One link of the default handler chain.
#[derive(Debug, Default)]
pub struct DefaultHandlerProvider {
    handler: ArcSwapOption<Router>,
    parent: ArcSwapOption<DefaultHandlerProvider>,
}

impl DefaultHandlerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Arc<DefaultHandlerProvider>) -> Self {
        let provider = Self::new();
        provider.set_parent(parent);
        provider
    }

    pub fn set_default_handler(&self, handler: Router) {
        self.handler.store(Some(Arc::new(handler)));
    }

    pub fn clear_default_handler(&self) {
        self.handler.store(None);
    }

    pub fn set_parent(&self, parent: Arc<DefaultHandlerProvider>) {
        self.parent.store(Some(parent));
    }

    /// The first handler set on this provider or one of its ancestors.
    pub fn default_handler(&self) -> Option<Router> {
        if let Some(handler) = self.handler.load_full() {
            return Some(Router::clone(&handler));
        }

        let mut next = self.parent.load_full();
        for _ in 0..MAX_CHAIN_DEPTH {
            let provider = next?;
            if let Some(handler) = provider.handler.load_full() {
                return Some(Router::clone(&handler));
            }
            next = provider.parent.load_full();
        }

        tracing::warn!(depth = MAX_CHAIN_DEPTH, "Default handler chain too deep, giving up");
        None
    }

    /// Serve a request with the resolved default handler, or an empty 404.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        match self.default_handler() {
            Some(handler) => match handler.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            },
            None => not_found(),
        }
    }
}

/// Built-in terminal response: `404` with an empty body.
pub fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}
