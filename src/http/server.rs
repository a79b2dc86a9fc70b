//! Logical server: one set of APIs served on many bind points.
//!
//! # Responsibilities
//! - Build every API handler through the registry and one dispatcher
//! - Resolve the TLS identity of each bind point and bind its listener
//! - Wrap the dispatcher in the request pipeline of each bind point
//! - Serve every listener on its own task and shut them down gracefully
//!
//! # Design Decisions
//! - Listeners are bound while building; accepting starts with [`Server::start`]
//! - One listener failing never stops its siblings
//! - A bind point without an identity must be marked plaintext
//! - Idle keep-alive connections are closed by the acceptor, see [`crate::net::connection`]
//! - The pipeline is assembled at start so mutators can still install hooks
//!
//! # Data Flow
//! ```text
//! request
//!     → TraceLayer → compression → after_handler hook
//!     → replacement address header → panic containment
//!     → ServerContext extension → write timeout → before_handler hook
//!     → Dispatcher → handler | API default | fallback chain | 404
//! ```

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{HeaderValue, InvalidHeaderValue};
use axum::{middleware, Extension, Router};
use axum_server::accept::DefaultAcceptor;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use axum_server::Handle;
use futures_util::future::join_all;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use tokio::task::JoinHandle;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{InstanceConfig, ServerConfig, ServerOptions};
use crate::http::context::ServerContext;
use crate::http::middleware::{recover_panics, replacement_address_layer, replacement_address_value, PanicHook};
use crate::net::{
    BindPoint, BindPointError, BindPointRegistry, BoundListener, Identity, IdentityError, IdleTimeoutAcceptor,
};
use crate::registry::Registry;
use crate::routing::{DefaultHandlerProvider, DemuxError, DemuxFactory, Dispatcher};
use crate::BoxError;

/// Extra wait past the grace period before a listener task is abandoned, so
/// connections the handle closes at the deadline can still finish.
const SHUTDOWN_MARGIN: Duration = Duration::from_millis(250);

/// Error type for building and starting a logical server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server [{server}] references api binding [{binding}] which has no associated factory registered")]
    MissingFactory { server: String, binding: String },
    #[error("server [{server}] failed building handler for api binding [{binding}]: {source}")]
    HandlerFactory {
        server: String,
        binding: String,
        #[source]
        source: BoxError,
    },
    #[error("server [{server}] failed building its dispatcher: {source}")]
    Demux {
        server: String,
        #[source]
        source: DemuxError,
    },
    #[error("server [{server}] failed loading its identity: {source}")]
    Identity {
        server: String,
        #[source]
        source: IdentityError,
    },
    #[error("server [{server}] bind point [{interface}] is invalid: {}", join_errors(.errors))]
    InvalidBindPoint {
        server: String,
        interface: String,
        errors: Vec<BindPointError>,
    },
    #[error("server [{server}] bind point [{interface}] has no identity and is not marked plaintext")]
    NoIdentity { server: String, interface: String },
    #[error("server [{server}] bind point [{interface}]: {source}")]
    BindPoint {
        server: String,
        interface: String,
        #[source]
        source: BindPointError,
    },
    #[error("server [{server}] new address [{address}] cannot be sent as a header: {source}")]
    NewAddressHeader {
        server: String,
        address: String,
        #[source]
        source: InvalidHeaderValue,
    },
    #[error("server [{server}] has no listener left to start")]
    AlreadyStarted { server: String },
}

fn join_errors(errors: &[BindPointError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Everything a server needs from its instance while building.
pub struct BuildContext<'a> {
    pub instance: Arc<InstanceConfig>,
    pub registry: &'a dyn Registry,
    pub bind_points: &'a BindPointRegistry,
    pub demux: &'a dyn DemuxFactory,
    /// The instance's link of the default handler chain.
    pub fallback: Arc<DefaultHandlerProvider>,
    /// Instance-wide identity, used when neither bind point nor server has one.
    pub default_identity: Option<Arc<Identity>>,
}

/// How one listener ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// Drained within the grace period.
    Stopped,
    /// Ended with an error, before or during shutdown.
    Failed(String),
    /// Still running at the deadline; its task was aborted.
    Abandoned,
    /// Bound but never started.
    NeverStarted,
}

#[derive(Debug, Clone)]
pub struct ListenerReport {
    pub interface: String,
    pub local_addr: SocketAddr,
    pub outcome: ListenerOutcome,
}

/// Result of [`Server::shutdown`], one entry per listener.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub server: String,
    pub listeners: Vec<ListenerReport>,
}

impl ShutdownReport {
    /// Whether every started listener drained in time.
    pub fn all_stopped(&self) -> bool {
        self.listeners
            .iter()
            .all(|listener| matches!(listener.outcome, ListenerOutcome::Stopped | ListenerOutcome::NeverStarted))
    }
}

enum ListenerState {
    Bound(BoundListener),
    Running {
        handle: Handle,
        task: JoinHandle<io::Result<()>>,
    },
}

struct ListenerSlot {
    bind_point: Box<dyn BindPoint>,
    context: ServerContext,
    local_addr: SocketAddr,
    new_address: Option<HeaderValue>,
    state: Option<ListenerState>,
}

/// A logical server: its handlers, dispatcher and listeners.
pub struct Server {
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher,
    fallback: Arc<DefaultHandlerProvider>,
    listeners: Vec<ListenerSlot>,
    panic_hook: Option<PanicHook>,
}

impl Server {
    /// Build a server and bind all of its listeners.
    pub fn build(ctx: &BuildContext<'_>, config: Arc<ServerConfig>) -> Result<Self, ServerError> {
        let name = config.name.clone();

        let mut handlers = Vec::with_capacity(config.apis.len());
        for api in &config.apis {
            let factory = ctx.registry.get(&api.binding).ok_or_else(|| ServerError::MissingFactory {
                server: name.clone(),
                binding: api.binding.clone(),
            })?;

            let mut handler = factory
                .new_handler(&config, &api.options)
                .map_err(|source| ServerError::HandlerFactory {
                    server: name.clone(),
                    binding: api.binding.clone(),
                    source,
                })?;
            if api.default {
                handler = handler.declare_default();
            }
            handlers.push(handler);
        }

        let dispatcher = ctx.demux.build(handlers).map_err(|source| ServerError::Demux {
            server: name.clone(),
            source,
        })?;

        let fallback = Arc::new(DefaultHandlerProvider::with_parent(ctx.fallback.clone()));
        dispatcher.fallback().set_parent(fallback.clone());

        let identity_error = |source: IdentityError| ServerError::Identity {
            server: name.clone(),
            source,
        };
        let server_identity = match &config.identity {
            Some(identity) => Some(Arc::new(Identity::load(identity).map_err(identity_error)?)),
            None => ctx.default_identity.clone(),
        };

        let mut listeners = Vec::with_capacity(config.bind_points.len());
        for bind_point_config in &config.bind_points {
            let interface = bind_point_config.interface.clone();
            let bind_point_error = |source: BindPointError| ServerError::BindPoint {
                server: name.clone(),
                interface: interface.clone(),
                source,
            };

            let bind_point = ctx.bind_points.new_bind_point(bind_point_config).map_err(bind_point_error)?;

            let identity = match &bind_point_config.identity {
                Some(identity) => Some(Arc::new(Identity::load(identity).map_err(identity_error)?)),
                None => server_identity.clone(),
            };

            let errors = bind_point.validate(identity.as_deref());
            if !errors.is_empty() {
                return Err(ServerError::InvalidBindPoint {
                    server: name.clone(),
                    interface: interface.clone(),
                    errors,
                });
            }

            let tls = match &identity {
                Some(identity) => Some(identity.server_config(&config.options).map_err(identity_error)?),
                None if bind_point_config.plaintext => {
                    tracing::warn!(
                        server = %name,
                        interface = %interface,
                        "Bind point marked plaintext, serving plain HTTP"
                    );
                    None
                }
                None => {
                    return Err(ServerError::NoIdentity {
                        server: name.clone(),
                        interface: interface.clone(),
                    })
                }
            };

            let new_address = bind_point
                .new_address()
                .map(|address| {
                    replacement_address_value(address).map_err(|source| ServerError::NewAddressHeader {
                        server: name.clone(),
                        address: address.to_string(),
                        source,
                    })
                })
                .transpose()?;

            let listener = bind_point.listener(&name, tls).map_err(bind_point_error)?;
            let local_addr = listener.local_addr();

            listeners.push(ListenerSlot {
                context: ServerContext::new(
                    Arc::new(bind_point_config.clone()),
                    config.clone(),
                    ctx.instance.clone(),
                ),
                bind_point,
                local_addr,
                new_address,
                state: Some(ListenerState::Bound(listener)),
            });
        }

        tracing::info!(
            server = %name,
            apis = ?config.api_bindings(),
            listeners = listeners.len(),
            "Server built"
        );

        Ok(Self {
            config,
            dispatcher,
            fallback,
            listeners,
            panic_hook: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Bindings of the APIs this server hosts, in routing order.
    pub fn api_bindings(&self) -> Vec<String> {
        self.config.api_bindings()
    }

    /// Addresses the listeners are bound to, in bind point order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|slot| slot.local_addr).collect()
    }

    /// The server's link of the default handler chain.
    pub fn fallback(&self) -> &Arc<DefaultHandlerProvider> {
        &self.fallback
    }

    pub fn set_default_handler(&self, handler: Router) {
        self.fallback.set_default_handler(handler);
    }

    pub fn clear_default_handler(&self) {
        self.fallback.clear_default_handler();
    }

    /// Replace the empty `500` answered after a handler panicked.
    pub fn set_panic_hook(&mut self, hook: PanicHook) {
        self.panic_hook = Some(hook);
    }

    /// Start accepting on every bound listener, one task each.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let mut started = 0;

        for slot in &mut self.listeners {
            let listener = match slot.state.take() {
                Some(ListenerState::Bound(listener)) => listener,
                other => {
                    slot.state = other;
                    continue;
                }
            };

            let app = pipeline(
                &self.dispatcher,
                slot,
                &self.config.options,
                self.panic_hook.clone(),
            );
            let handle = Handle::new();
            let task = tokio::spawn(serve(
                self.config.name.clone(),
                self.config.api_bindings(),
                listener,
                app,
                handle.clone(),
                self.config.options.clone(),
            ));

            slot.state = Some(ListenerState::Running { handle, task });
            started += 1;
        }

        if started == 0 {
            return Err(ServerError::AlreadyStarted {
                server: self.config.name.clone(),
            });
        }
        Ok(())
    }

    /// Gracefully stop every listener, abandoning those still busy after `grace`.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        let server = self.config.name.clone();
        tracing::info!(server = %server, grace_secs = grace.as_secs_f64(), "Shutting down server");

        let listeners = join_all(self.listeners.into_iter().map(|slot| {
            let server = server.clone();
            async move {
                let interface = slot.bind_point.interface_address().to_string();
                let outcome = match slot.state {
                    Some(ListenerState::Running { handle, task }) => stop_listener(handle, task, grace).await,
                    _ => ListenerOutcome::NeverStarted,
                };
                tracing::info!(
                    server = %server,
                    interface = %interface,
                    address = %slot.local_addr,
                    outcome = ?outcome,
                    "Listener shut down"
                );
                ListenerReport {
                    interface,
                    local_addr: slot.local_addr,
                    outcome,
                }
            }
        }))
        .await;

        ShutdownReport { server, listeners }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.config.name)
            .field("dispatcher", &self.dispatcher)
            .field("local_addrs", &self.local_addrs())
            .field("panic_hook", &self.panic_hook.is_some())
            .finish()
    }
}

/// Assemble the request pipeline of one bind point around the dispatcher.
#[allow(deprecated)]
fn pipeline(
    dispatcher: &Dispatcher,
    slot: &ListenerSlot,
    options: &ServerOptions,
    panic_hook: Option<PanicHook>,
) -> Router {
    let bind_point = slot.bind_point.as_ref();

    let app = bind_point
        .before_handler(dispatcher.clone().into_router())
        .layer(TimeoutLayer::new(options.write_timeout()))
        .layer(Extension(slot.context.clone()))
        .layer(middleware::from_fn_with_state(panic_hook, recover_panics));

    let app = match &slot.new_address {
        Some(value) => app.layer(replacement_address_layer(value.clone())),
        None => app,
    };

    bind_point
        .after_handler(app)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn configure_connections(builder: &mut ConnectionBuilder<TokioExecutor>, options: &ServerOptions) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(options.read_timeout());
    builder.http2().timer(TokioTimer::new());
}

async fn serve(
    server: String,
    apis: Vec<String>,
    listener: BoundListener,
    app: Router,
    handle: Handle,
    options: ServerOptions,
) -> io::Result<()> {
    let local_addr = listener.local_addr();
    let (listener, tls) = listener.into_parts();
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    tracing::info!(
        server = %server,
        address = %local_addr,
        tls = tls.is_some(),
        apis = ?apis,
        "Listener serving"
    );

    let idle = IdleTimeoutAcceptor::new(DefaultAcceptor, options.idle_timeout());
    let result = match tls {
        Some(tls) => {
            let acceptor = RustlsAcceptor::new(RustlsConfig::from_config(tls)).acceptor(idle);
            let mut http = axum_server::from_tcp(listener).acceptor(acceptor).handle(handle);
            configure_connections(http.http_builder(), &options);
            http.serve(make_service).await
        }
        None => {
            let mut http = axum_server::from_tcp(listener).acceptor(idle).handle(handle);
            configure_connections(http.http_builder(), &options);
            http.serve(make_service).await
        }
    };

    match &result {
        Ok(()) => tracing::info!(server = %server, address = %local_addr, "Listener stopped"),
        Err(e) => tracing::error!(server = %server, address = %local_addr, error = %e, "Listener failed"),
    }
    result
}

async fn stop_listener(handle: Handle, mut task: JoinHandle<io::Result<()>>, grace: Duration) -> ListenerOutcome {
    if task.is_finished() {
        return match task.await {
            Ok(Ok(())) => ListenerOutcome::Stopped,
            Ok(Err(e)) => ListenerOutcome::Failed(e.to_string()),
            Err(e) => ListenerOutcome::Failed(e.to_string()),
        };
    }

    handle.graceful_shutdown(Some(grace));

    match tokio::time::timeout(grace + SHUTDOWN_MARGIN, &mut task).await {
        Ok(Ok(Ok(()))) => ListenerOutcome::Stopped,
        Ok(Ok(Err(e))) => ListenerOutcome::Failed(e.to_string()),
        Ok(Err(e)) => ListenerOutcome::Failed(e.to_string()),
        Err(_) => {
            task.abort();
            ListenerOutcome::Abandoned
        }
    }
}
