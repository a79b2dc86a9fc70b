//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for an instance.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default HTTP write timeout (whole request handling budget).
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;
/// Default HTTP read timeout (time allowed to receive request headers).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;
/// Default idle timeout for keep-alive connections.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 5;

/// Options payload handed to an API factory. Opaque to the core.
pub type ApiOptions = toml::Table;

/// Root configuration: every logical server of one instance.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InstanceConfig {
    /// Demux strategy used when the instance has no explicit factory installed.
    pub demux: DemuxStrategy,

    /// Instance-wide default TLS identity.
    pub identity: Option<IdentityConfig>,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Logical servers, in declaration order.
    pub servers: Vec<ServerConfig>,
}

/// Which demux strategy routes requests to APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DemuxStrategy {
    /// First API whose root path prefixes the request path.
    PathPrefix,
    /// First API whose `is_handler` predicate accepts the request.
    #[default]
    Predicate,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error or a full EnvFilter).
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

/// One logical server: a set of APIs served on a set of bind points.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Unique server name, used for logging and TLS listener naming.
    pub name: String,

    /// APIs hosted by this server, in routing order.
    #[serde(default)]
    pub apis: Vec<ApiConfig>,

    /// Physical listeners of this server.
    #[serde(default)]
    pub bind_points: Vec<BindPointConfig>,

    /// Server identity, overrides the instance identity.
    #[serde(default)]
    pub identity: Option<IdentityConfig>,

    /// Transport options.
    #[serde(default)]
    pub options: ServerOptions,
}

impl ServerConfig {
    /// Create a server config with default options and no APIs or bind points.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            apis: Vec::new(),
            bind_points: Vec::new(),
            identity: None,
            options: ServerOptions::default(),
        }
    }

    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.apis.push(api);
        self
    }

    pub fn with_bind_point(mut self, bind_point: BindPointConfig) -> Self {
        self.bind_points.push(bind_point);
        self
    }

    /// Bindings of every API, in declaration order.
    pub fn api_bindings(&self) -> Vec<String> {
        self.apis.iter().map(|api| api.binding.clone()).collect()
    }
}

/// An API hosted by a server, resolved through the registry by binding name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Binding name of the factory that builds the handler.
    pub binding: String,

    /// Factory specific options.
    #[serde(default)]
    pub options: ApiOptions,

    /// Declare this API the default for unmatched requests.
    #[serde(default)]
    pub default: bool,
}

impl ApiConfig {
    pub fn new(binding: impl Into<String>) -> Self {
        Self {
            binding: binding.into(),
            options: ApiOptions::new(),
            default: false,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }
}

/// Where and how a server listens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindPointConfig {
    /// Bind point factory selector.
    #[serde(default = "default_bind_point_kind")]
    pub kind: String,

    /// Interface to bind, `<interface>:<port>`.
    pub interface: String,

    /// Publicly advertised address, `<host>:<port>`.
    pub address: String,

    /// Replacement address announced to clients on every response.
    #[serde(default)]
    pub new_address: Option<String>,

    /// Identity for this bind point only.
    #[serde(default)]
    pub identity: Option<IdentityConfig>,

    /// Serve plain HTTP when no identity applies. A missing identity is an
    /// error otherwise.
    #[serde(default)]
    pub plaintext: bool,
}

fn default_bind_point_kind() -> String {
    "tcp".to_string()
}

impl BindPointConfig {
    pub fn new(interface: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            kind: default_bind_point_kind(),
            interface: interface.into(),
            address: address.into(),
            new_address: None,
            identity: None,
            plaintext: false,
        }
    }

    pub fn with_new_address(mut self, new_address: impl Into<String>) -> Self {
        self.new_address = Some(new_address.into());
        self
    }

    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn as_plaintext(mut self) -> Self {
        self.plaintext = true;
        self
    }
}

/// PEM files making up a TLS identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Certificate chain (PEM), leaf first.
    pub cert: PathBuf,

    /// Private key (PEM).
    pub key: PathBuf,

    /// CA bundle (PEM) used to verify client certificates.
    #[serde(default)]
    pub ca: Option<PathBuf>,
}

/// Transport options shared by every bind point of a server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Time allowed to receive request headers, in seconds.
    pub read_timeout_secs: u64,

    /// Time allowed to produce a response, in seconds.
    pub write_timeout_secs: u64,

    /// Keep-alive idle timeout, in seconds.
    pub idle_timeout_secs: u64,

    pub min_tls_version: TlsVersion,

    pub max_tls_version: TlsVersion,

    /// Client certificate policy.
    pub client_auth: ClientAuthPolicy,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            min_tls_version: TlsVersion::Tls12,
            max_tls_version: TlsVersion::Tls13,
            client_auth: ClientAuthPolicy::RequestClientCert,
        }
    }
}

impl ServerOptions {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// TLS protocol versions, ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum TlsVersion {
    #[serde(rename = "TLS1.0")]
    Tls10,
    #[serde(rename = "TLS1.1")]
    Tls11,
    #[serde(rename = "TLS1.2")]
    Tls12,
    #[serde(rename = "TLS1.3")]
    Tls13,
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TlsVersion::Tls10 => "TLS1.0",
            TlsVersion::Tls11 => "TLS1.1",
            TlsVersion::Tls12 => "TLS1.2",
            TlsVersion::Tls13 => "TLS1.3",
        };
        f.write_str(name)
    }
}

/// Client certificate policy of a TLS listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthPolicy {
    NoClientCert,
    #[default]
    RequestClientCert,
    RequireAnyClientCert,
    VerifyClientCertIfGiven,
    RequireAndVerifyClientCert,
}

impl ClientAuthPolicy {
    /// Whether a client certificate is requested at all.
    pub fn requests_cert(&self) -> bool {
        !matches!(self, ClientAuthPolicy::NoClientCert)
    }

    /// Whether the handshake fails when the client presents no certificate.
    pub fn requires_cert(&self) -> bool {
        matches!(
            self,
            ClientAuthPolicy::RequireAnyClientCert | ClientAuthPolicy::RequireAndVerifyClientCert
        )
    }
}
