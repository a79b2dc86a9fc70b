//! Instance: owner and orchestrator of every logical server.
//!
//! # Responsibilities
//! - Build one [`Server`] per server configuration
//! - Start all servers and shut them down within a bounded grace period
//! - Anchor the default handler chain
//!
//! # Design Decisions
//! - Interface collisions are rejected before any socket is bound
//! - The first build failure aborts the build; nothing is started
//! - A start failure of one server never stops the others

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;

use crate::config::validation::interface_collisions;
use crate::config::{validate_config, InstanceConfig, ServerConfig, ValidationError};
use crate::http::{BuildContext, Server, ServerError};
use crate::lifecycle::shutdown::ShutdownWaiter;
use crate::net::{BindPointRegistry, Identity, IdentityError};
use crate::registry::Registry;
use crate::routing::{DefaultHandlerProvider, DemuxFactory};
use crate::BoxError;

/// Time each server gets to drain before its listeners are abandoned.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Adjusts a freshly built server, for example to install a panic hook.
pub type ServerMutator = Box<dyn Fn(&ServerConfig, &mut Server) -> Result<(), BoxError> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("instance has already been built")]
    AlreadyBuilt,
    #[error("bind points collide: {}", join(.0))]
    InterfaceCollision(Vec<ValidationError>),
    #[error("failed loading the default identity: {0}")]
    Identity(#[source] IdentityError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("encountered error mutating server [{server}]: {source}")]
    Mutator {
        server: String,
        #[source]
        source: BoxError,
    },
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Builds, starts and stops the logical servers of one configuration.
pub struct Instance {
    config: Arc<InstanceConfig>,
    registry: Box<dyn Registry>,
    bind_points: BindPointRegistry,
    demux: Box<dyn DemuxFactory>,
    fallback: Arc<DefaultHandlerProvider>,
    mutators: Vec<ServerMutator>,
    servers: Vec<Server>,
    built: bool,
    shutdown_grace: Duration,
}

impl Instance {
    /// An instance using the configured demux strategy and the TCP bind point.
    pub fn new(config: InstanceConfig, registry: impl Registry + 'static) -> Self {
        let demux = config.demux.factory();
        Self {
            config: Arc::new(config),
            registry: Box::new(registry),
            bind_points: BindPointRegistry::default(),
            demux,
            fallback: Arc::new(DefaultHandlerProvider::new()),
            mutators: Vec::new(),
            servers: Vec::new(),
            built: false,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }

    pub fn with_demux_factory(mut self, demux: Box<dyn DemuxFactory>) -> Self {
        self.demux = demux;
        self
    }

    pub fn with_bind_point_registry(mut self, bind_points: BindPointRegistry) -> Self {
        self.bind_points = bind_points;
        self
    }

    pub fn with_server_mutator(
        mut self,
        mutator: impl Fn(&ServerConfig, &mut Server) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.mutators.push(Box::new(mutator));
        self
    }

    /// Override [`SHUTDOWN_GRACE`].
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn registry(&self) -> &dyn Registry {
        self.registry.as_ref()
    }

    pub fn demux_factory(&self) -> &dyn DemuxFactory {
        self.demux.as_ref()
    }

    /// Check the configuration against the registry.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validate_config(&self.config, self.registry.as_ref())
    }

    /// Build every server and bind every listener. Nothing accepts yet.
    pub fn build(&mut self) -> Result<(), InstanceError> {
        if self.built {
            return Err(InstanceError::AlreadyBuilt);
        }

        let collisions = interface_collisions(&self.config.servers);
        if !collisions.is_empty() {
            return Err(InstanceError::InterfaceCollision(collisions));
        }

        let default_identity = self
            .config
            .identity
            .as_ref()
            .map(Identity::load)
            .transpose()
            .map_err(InstanceError::Identity)?
            .map(Arc::new);

        let ctx = BuildContext {
            instance: self.config.clone(),
            registry: self.registry.as_ref(),
            bind_points: &self.bind_points,
            demux: self.demux.as_ref(),
            fallback: self.fallback.clone(),
            default_identity,
        };

        let mut servers = Vec::with_capacity(self.config.servers.len());
        for server_config in &self.config.servers {
            let mut server = Server::build(&ctx, Arc::new(server_config.clone()))?;

            for mutator in &self.mutators {
                mutator(server_config, &mut server).map_err(|source| InstanceError::Mutator {
                    server: server_config.name.clone(),
                    source,
                })?;
            }
            servers.push(server);
        }

        tracing::info!(servers = servers.len(), "Instance built");
        self.servers = servers;
        self.built = true;
        Ok(())
    }

    /// Start every built server.
    pub fn start(&mut self) {
        if self.servers.is_empty() {
            tracing::warn!("No servers to start, build the instance first");
        }

        for server in &mut self.servers {
            if let Err(e) = server.start() {
                tracing::error!(server = %server.name(), error = %e, "Error starting server");
            }
        }
    }

    /// Build, then start.
    pub fn run(&mut self) -> Result<(), InstanceError> {
        self.build()?;
        self.start();
        Ok(())
    }

    /// Shut down every server concurrently, each on its own task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn shutdown(&mut self) -> ShutdownWaiter {
        let grace = self.shutdown_grace;
        let servers = std::mem::take(&mut self.servers);

        tracing::info!(servers = servers.len(), grace_secs = grace.as_secs(), "Instance shutting down");

        ShutdownWaiter::new(
            servers
                .into_iter()
                .map(|server| tokio::spawn(server.shutdown(grace)))
                .collect(),
        )
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.iter().find(|server| server.name() == name)
    }

    pub fn server_mut(&mut self, name: &str) -> Option<&mut Server> {
        self.servers.iter_mut().find(|server| server.name() == name)
    }

    /// The root of the default handler chain.
    pub fn fallback(&self) -> &Arc<DefaultHandlerProvider> {
        &self.fallback
    }

    pub fn set_default_handler(&self, handler: Router) {
        self.fallback.set_default_handler(handler);
    }

    pub fn clear_default_handler(&self) {
        self.fallback.clear_default_handler();
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("servers", &self.servers)
            .field("demux", &self.demux)
            .field("bind_points", &self.bind_points)
            .field("mutators", &self.mutators.len())
            .field("built", &self.built)
            .finish()
    }
}
