//! Demultiplexing of requests across the APIs of one logical server.
//!
//! # Responsibilities
//! - Resolve which handler acts as the API-level default
//! - Reject ambiguous handler sets at composition time
//! - Route each request to exactly one handler or fallback
//!
//! # Design Decisions
//! - A [`Dispatcher`] is a pure function of its ordered handler list
//! - Immutable after construction (shared across requests without locks)
//! - Unmatched requests go to the API-level default, then the fallback
//!   provider chain, then an empty 404

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;

use crate::config::DemuxStrategy;
use crate::routing::fallback::DefaultHandlerProvider;
use crate::routing::matcher::{Matcher, PathPrefixMatcher, PredicateMatcher};
use crate::routing::{Handler, SelectedHandler};

/// Composition errors raised while building a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DemuxError {
    #[error("no handlers provided")]
    NoHandlers,
    #[error(
        "too many default handlers found, ensure that only one handler is marked as the default: {}",
        .handlers.join(",")
    )]
    TooManyDefaults {
        /// `[Binding: .., Type: ..]` of every conflicting handler.
        handlers: Vec<String>,
    },
    #[error("duplicate root path [{root_path}] detected for both bindings [{second}] and [{first}]")]
    DuplicateRootPath {
        root_path: String,
        first: String,
        second: String,
    },
}

/// Builds a [`Dispatcher`] from the ordered handlers of a logical server.
pub trait DemuxFactory: Send + Sync + fmt::Debug {
    fn build(&self, handlers: Vec<Handler>) -> Result<Dispatcher, DemuxError>;
}

/// Routes by URL path prefix, see [`PathPrefixMatcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PathPrefixDemuxFactory;

impl DemuxFactory for PathPrefixDemuxFactory {
    fn build(&self, handlers: Vec<Handler>) -> Result<Dispatcher, DemuxError> {
        let default_api = resolve_default(&handlers)?;

        for (index, handler) in handlers.iter().enumerate() {
            if let Some(existing) = handlers[..index]
                .iter()
                .find(|earlier| earlier.root_path() == handler.root_path())
            {
                return Err(DemuxError::DuplicateRootPath {
                    root_path: handler.root_path().to_string(),
                    first: existing.binding().to_string(),
                    second: handler.binding().to_string(),
                });
            }
        }

        Ok(Dispatcher::new(handlers, Some(default_api), Box::new(PathPrefixMatcher)))
    }
}

/// Routes by asking every handler whether it accepts the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateDemuxFactory;

impl DemuxFactory for PredicateDemuxFactory {
    fn build(&self, handlers: Vec<Handler>) -> Result<Dispatcher, DemuxError> {
        let default_api = resolve_default(&handlers)?;
        Ok(Dispatcher::new(handlers, Some(default_api), Box::new(PredicateMatcher)))
    }
}

impl DemuxStrategy {
    pub fn factory(self) -> Box<dyn DemuxFactory> {
        match self {
            DemuxStrategy::PathPrefix => Box::new(PathPrefixDemuxFactory),
            DemuxStrategy::Predicate => Box::new(PredicateDemuxFactory),
        }
    }
}

/// Pick the handler serving requests that match no handler.
///
/// A single self-declared default wins. With none declared, the last handler
/// is used. More than one declared default is a composition error.
pub fn resolve_default(handlers: &[Handler]) -> Result<Handler, DemuxError> {
    let last = handlers.last().ok_or(DemuxError::NoHandlers)?;

    let defaults: Vec<&Handler> = handlers.iter().filter(|handler| handler.is_default()).collect();

    match defaults.as_slice() {
        [] => {
            tracing::warn!(
                binding = %last.binding(),
                handler_type = %last.type_name(),
                "No default handlers were found, using the last handler as the default"
            );
            Ok(last.clone())
        }
        [single] => Ok((*single).clone()),
        many => Err(DemuxError::TooManyDefaults {
            handlers: many.iter().map(|handler| handler.describe()).collect(),
        }),
    }
}

/// The built request router of a logical server.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    handlers: Vec<Handler>,
    default_api: Option<Handler>,
    matcher: Box<dyn Matcher>,
    fallback: Arc<DefaultHandlerProvider>,
}

impl Dispatcher {
    /// Without a `default_api`, unmatched requests go to the fallback chain.
    pub fn new(handlers: Vec<Handler>, default_api: Option<Handler>, matcher: Box<dyn Matcher>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                handlers,
                default_api,
                matcher,
                fallback: Arc::new(DefaultHandlerProvider::new()),
            }),
        }
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.inner.handlers
    }

    /// The API-level default resolved at build time.
    pub fn default_api(&self) -> Option<&Handler> {
        self.inner.default_api.as_ref()
    }

    /// This dispatcher's link of the default handler chain.
    pub fn fallback(&self) -> &Arc<DefaultHandlerProvider> {
        &self.inner.fallback
    }

    /// The handler a request would be routed to, if any.
    pub fn select(&self, request: &Request<Body>) -> Option<&Handler> {
        self.inner
            .matcher
            .select(&self.inner.handlers, request)
            .or(self.inner.default_api.as_ref())
    }

    pub async fn dispatch(&self, mut request: Request<Body>) -> Response {
        let Some(handler) = self.select(&request).cloned() else {
            tracing::debug!(path = %request.uri().path(), "No handler selected, using fallback chain");
            return self.inner.fallback.serve(request).await;
        };

        tracing::trace!(
            binding = %handler.binding(),
            path = %request.uri().path(),
            "Dispatching request"
        );

        request.extensions_mut().insert(SelectedHandler(handler.clone()));
        let mut response = handler.serve(request).await;
        response.extensions_mut().insert(SelectedHandler(handler));
        response
    }

    /// Wrap this dispatcher as a catch-all [`Router`].
    pub fn into_router(self) -> Router {
        Router::new().fallback(move |request: Request<Body>| {
            let dispatcher = self.clone();
            async move { dispatcher.dispatch(request).await }
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.inner.handlers)
            .field("default_api", &self.inner.default_api.as_ref().map(Handler::binding))
            .field("matcher", &self.inner.matcher)
            .finish()
    }
}
