//! Handler selection strategies.
//!
//! # Design Decisions
//! - Handlers are tested in declaration order; first match wins
//! - Path matching is a plain, case-sensitive prefix test
//! - No longest-prefix or specificity ranking

use axum::body::Body;
use axum::http::Request;

use crate::routing::Handler;

/// Trait for picking the handler that serves a request.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns the first handler that accepts the request.
    fn select<'a>(&self, handlers: &'a [Handler], req: &Request<Body>) -> Option<&'a Handler>;
}

/// Selects the first handler whose root path prefixes the request path.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathPrefixMatcher;

impl Matcher for PathPrefixMatcher {
    fn select<'a>(&self, handlers: &'a [Handler], req: &Request<Body>) -> Option<&'a Handler> {
        let path = req.uri().path();
        handlers.iter().find(|handler| path.starts_with(handler.root_path()))
    }
}

/// Selects the first handler whose own predicate accepts the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateMatcher;

impl Matcher for PredicateMatcher {
    fn select<'a>(&self, handlers: &'a [Handler], req: &Request<Body>) -> Option<&'a Handler> {
        handlers.iter().find(|handler| handler.is_handler(req))
    }
}
