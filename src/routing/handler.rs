//! API handler contract.
//!
//! An [`ApiHandler`] is a named unit of request handling mounted on a logical
//! server. The demux engine only ever sees [`Handler`], a cheap clonable
//! wrapper that also carries the "declares itself default" tag.

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use crate::config::ApiOptions;

/// A request handler hosted on a logical server.
pub trait ApiHandler: Send + Sync + 'static {
    /// Binding name, unique within a logical server.
    fn binding(&self) -> &str;

    /// Options the handler was built from.
    fn options(&self) -> &ApiOptions;

    /// Root path used by path-prefix demultiplexing.
    fn root_path(&self) -> &str;

    /// Whether this handler accepts the request, used by predicate demultiplexing.
    fn is_handler(&self, request: &Request<Body>) -> bool;

    /// The service that answers requests routed to this handler.
    fn router(&self) -> Router;

    /// Concrete type name, reported in composition errors.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An [`ApiHandler`] tagged for the demux engine.
#[derive(Clone)]
pub struct Handler {
    api: Arc<dyn ApiHandler>,
    service: Router,
    is_default: bool,
}

impl Handler {
    pub fn new(api: impl ApiHandler) -> Self {
        Self::from_arc(Arc::new(api))
    }

    pub fn from_arc(api: Arc<dyn ApiHandler>) -> Self {
        let service = api.router();
        Self {
            api,
            service,
            is_default: false,
        }
    }

    /// Mark this handler as the server's default for unmatched requests.
    pub fn declare_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn binding(&self) -> &str {
        self.api.binding()
    }

    pub fn options(&self) -> &ApiOptions {
        self.api.options()
    }

    pub fn root_path(&self) -> &str {
        self.api.root_path()
    }

    pub fn is_handler(&self, request: &Request<Body>) -> bool {
        self.api.is_handler(request)
    }

    pub fn type_name(&self) -> &'static str {
        self.api.type_name()
    }

    pub fn api(&self) -> &Arc<dyn ApiHandler> {
        &self.api
    }

    /// `[Binding: <binding>, Type: <type>]`, as used in error messages.
    pub fn describe(&self) -> String {
        format!("[Binding: {}, Type: {}]", self.binding(), self.type_name())
    }

    pub(crate) async fn serve(&self, request: Request<Body>) -> Response {
        match self.service.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("binding", &self.binding())
            .field("type", &self.type_name())
            .field("root_path", &self.root_path())
            .field("is_default", &self.is_default)
            .finish()
    }
}

/// The handler chosen by the dispatcher.
///
/// Inserted into both the request extensions (for the handler itself) and
/// the response extensions (for middleware running after dispatch).
#[derive(Clone, Debug)]
pub struct SelectedHandler(pub Handler);

impl SelectedHandler {
    pub fn binding(&self) -> &str {
        self.0.binding()
    }
}
