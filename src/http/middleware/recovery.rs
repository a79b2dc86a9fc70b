//! Panic containment.
//!
//! A panic raised while a request is handled is caught here, logged with a
//! backtrace and turned into a response. The connection and the listener
//! keep serving.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

/// Builds the response sent after a handler panicked.
pub type PanicHook = Arc<dyn Fn(&PanicReport) -> Response + Send + Sync>;

/// What is known about a request whose handler panicked.
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub method: Method,
    pub uri: Uri,
    pub message: String,
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.method, self.uri, self.message)
    }
}

/// Middleware catching panics of the inner service.
///
/// Answers an empty `500` unless a [`PanicHook`] is installed.
pub async fn recover_panics(State(hook): State<Option<PanicHook>>, request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let report = PanicReport {
                method,
                uri,
                message: panic_message(panic.as_ref()),
            };
            let backtrace = Backtrace::capture();

            tracing::error!(
                method = %report.method,
                uri = %report.uri,
                panic_message = %report.message,
                backtrace = %backtrace,
                "Panic caught by server handler"
            );

            match hook {
                Some(hook) => hook(&report),
                None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
