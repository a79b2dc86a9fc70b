//! TLS identities and rustls server configuration.
//!
//! # Responsibilities
//! - Load certificate chains, private keys and client CA bundles from PEM
//! - Build the rustls `ServerConfig` of a bind point from server options
//! - Check that an identity is valid for an advertised address
//!
//! # Design Decisions
//! - The ring provider is always passed explicitly, never installed globally
//! - rustls only speaks TLS 1.2 and 1.3; older lower bounds are clamped
//! - Without a client CA bundle no client certificate is requested

use std::fmt;
use std::fs;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::config::{ClientAuthPolicy, IdentityConfig, ServerOptions, TlsVersion};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse PEM from {origin}: {source}")]
    Pem {
        origin: String,
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("invalid leaf certificate: {0}")]
    InvalidCertificate(String),
    #[error("no supported TLS version between {min} and {max}")]
    NoProtocolVersions { min: TlsVersion, max: TlsVersion },
    #[error("client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
    #[error(transparent)]
    Tls(#[from] rustls::Error),
}

/// A certificate chain, its private key and an optional client CA bundle.
pub struct Identity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_ca: Vec<CertificateDer<'static>>,
    dns_names: Vec<String>,
    ip_addresses: Vec<IpAddr>,
}

impl Identity {
    /// Load an identity from the PEM files named by `config`.
    pub fn load(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let cert = read(&config.cert)?;
        let key = read(&config.key)?;
        let ca = match &config.ca {
            Some(path) => Some((path.display().to_string(), read(path)?)),
            None => None,
        };

        let identity = Self::parse(
            &config.cert.display().to_string(),
            &cert,
            &config.key.display().to_string(),
            &key,
            ca.as_ref().map(|(origin, pem)| (origin.as_str(), pem.as_slice())),
        )?;

        tracing::debug!(
            cert = %config.cert.display(),
            names = ?identity.dns_names,
            client_ca = identity.client_ca.len(),
            "Loaded TLS identity"
        );
        Ok(identity)
    }

    /// Build an identity from in-memory PEM data.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], ca_pem: Option<&[u8]>) -> Result<Self, IdentityError> {
        Self::parse(
            "certificate PEM",
            cert_pem,
            "key PEM",
            key_pem,
            ca_pem.map(|pem| ("CA PEM", pem)),
        )
    }

    fn parse(
        cert_origin: &str,
        cert_pem: &[u8],
        key_origin: &str,
        key_pem: &[u8],
        ca: Option<(&str, &[u8])>,
    ) -> Result<Self, IdentityError> {
        let cert_chain = parse_certs(cert_origin, cert_pem)?;
        let key = parse_key(key_origin, key_pem)?;
        let client_ca = match ca {
            Some((origin, pem)) => parse_certs(origin, pem)?,
            None => Vec::new(),
        };

        let (dns_names, ip_addresses) = leaf_names(&cert_chain[0])?;

        Ok(Self {
            cert_chain,
            key,
            client_ca,
            dns_names,
            ip_addresses,
        })
    }

    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub fn has_client_ca(&self) -> bool {
        !self.client_ca.is_empty()
    }

    /// DNS names of the leaf certificate (SANs, then the common name).
    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }

    /// Whether the leaf certificate covers the host of `address` (`host:port` or bare host).
    pub fn valid_for(&self, address: &str) -> bool {
        let host = host_of(address);

        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.ip_addresses.contains(&ip) || self.dns_names.iter().any(|name| name == host);
        }

        self.dns_names.iter().any(|pattern| host_matches(pattern, host))
    }

    /// rustls configuration for a listener serving this identity.
    pub fn server_config(&self, options: &ServerOptions) -> Result<Arc<rustls::ServerConfig>, IdentityError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let versions = protocol_versions(options.min_tls_version, options.max_tls_version)?;

        let builder = rustls::ServerConfig::builder_with_provider(provider.clone()).with_protocol_versions(&versions)?;

        let builder = match self.client_verifier(options.client_auth, provider)? {
            Some(verifier) => builder.with_client_cert_verifier(verifier),
            None => builder.with_no_client_auth(),
        };

        let mut config = builder.with_single_cert(self.cert_chain.clone(), self.key.clone_key())?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Arc::new(config))
    }

    fn client_verifier(
        &self,
        policy: ClientAuthPolicy,
        provider: Arc<CryptoProvider>,
    ) -> Result<Option<Arc<dyn rustls::server::danger::ClientCertVerifier>>, IdentityError> {
        if !policy.requests_cert() {
            return Ok(None);
        }

        if self.client_ca.is_empty() {
            if policy.requires_cert() {
                tracing::warn!(
                    policy = ?policy,
                    "Client certificates required but no CA bundle configured, client authentication disabled"
                );
            }
            return Ok(None);
        }

        let mut roots = RootCertStore::empty();
        for cert in &self.client_ca {
            roots.add(cert.clone())?;
        }

        let builder = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
        let verifier = if policy.requires_cert() {
            builder.build()?
        } else {
            builder.allow_unauthenticated().build()?
        };
        Ok(Some(verifier))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("chain_len", &self.cert_chain.len())
            .field("dns_names", &self.dns_names)
            .field("ip_addresses", &self.ip_addresses)
            .field("client_ca", &self.client_ca.len())
            .finish_non_exhaustive()
    }
}

fn read(path: &Path) -> Result<Vec<u8>, IdentityError> {
    fs::read(path).map_err(|source| IdentityError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_certs(origin: &str, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| IdentityError::Pem {
            origin: origin.to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(IdentityError::NoCertificates(origin.to_string()));
    }
    Ok(certs)
}

fn parse_key(origin: &str, pem: &[u8]) -> Result<PrivateKeyDer<'static>, IdentityError> {
    let mut reader = BufReader::new(pem);
    loop {
        let item = rustls_pemfile::read_one(&mut reader).map_err(|source| IdentityError::Pem {
            origin: origin.to_string(),
            source,
        })?;

        match item {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(key.into()),
            Some(_) => continue,
            None => return Err(IdentityError::NoPrivateKey(origin.to_string())),
        }
    }
}

/// SAN DNS names (plus the subject CN) and SAN IP addresses of a certificate.
fn leaf_names(cert: &CertificateDer<'_>) -> Result<(Vec<String>, Vec<IpAddr>), IdentityError> {
    let (_, parsed) =
        X509Certificate::from_der(cert.as_ref()).map_err(|e| IdentityError::InvalidCertificate(e.to_string()))?;

    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();

    let san = parsed
        .subject_alternative_name()
        .map_err(|e| IdentityError::InvalidCertificate(e.to_string()))?;
    if let Some(san) = san {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push(dns.to_ascii_lowercase()),
                GeneralName::IPAddress(bytes) => {
                    if let Ok(octets) = <[u8; 4]>::try_from(*bytes) {
                        ip_addresses.push(IpAddr::V4(Ipv4Addr::from(octets)));
                    } else if let Ok(octets) = <[u8; 16]>::try_from(*bytes) {
                        ip_addresses.push(IpAddr::V6(Ipv6Addr::from(octets)));
                    }
                }
                _ => {}
            }
        }
    }

    for cn in parsed.subject().iter_common_name() {
        if let Ok(cn) = cn.as_str() {
            let cn = cn.to_ascii_lowercase();
            if !dns_names.contains(&cn) {
                dns_names.push(cn);
            }
        }
    }

    Ok((dns_names, ip_addresses))
}

/// Host part of `host:port`, `[v6]:port` or a bare host.
fn host_of(address: &str) -> &str {
    let address = address.trim();
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    match address.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host,
        _ => address,
    }
}

/// Case-insensitive DNS name match; `*.` wildcards cover exactly one label.
fn host_matches(pattern: &str, host: &str) -> bool {
    let host = host.trim_end_matches('.');
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
            None => false,
        };
    }
    pattern.eq_ignore_ascii_case(host)
}

fn protocol_versions(
    min: TlsVersion,
    max: TlsVersion,
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, IdentityError> {
    if min < TlsVersion::Tls12 {
        tracing::warn!(min = %min, "TLS versions below TLS1.2 are not supported, using TLS1.2 as the minimum");
    }

    let versions: Vec<_> = [
        (TlsVersion::Tls12, &rustls::version::TLS12),
        (TlsVersion::Tls13, &rustls::version::TLS13),
    ]
    .into_iter()
    .filter(|(version, _)| (min..=max).contains(version))
    .map(|(_, supported)| supported)
    .collect();

    if versions.is_empty() {
        return Err(IdentityError::NoProtocolVersions { min, max });
    }
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed(names: &[&str]) -> Identity {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(names.iter().map(|n| n.to_string()).collect::<Vec<_>>()).unwrap();
        Identity::from_pem(cert.pem().as_bytes(), key_pair.serialize_pem().as_bytes(), None).unwrap()
    }

    #[test]
    fn loads_names_from_pem() {
        let identity = self_signed(&["localhost", "api.example.com", "127.0.0.1"]);
        assert!(identity.dns_names().contains(&"localhost".to_string()));
        assert!(identity.valid_for("localhost:8443"));
        assert!(identity.valid_for("API.example.com:443"));
        assert!(identity.valid_for("127.0.0.1:1"));
        assert!(!identity.valid_for("other.example.com:443"));
        assert!(!identity.valid_for("10.0.0.1:443"));
        assert!(!identity.has_client_ca());
    }

    #[test]
    fn wildcard_covers_one_label() {
        assert!(host_matches("*.example.com", "a.example.com"));
        assert!(host_matches("*.example.com", "A.EXAMPLE.com"));
        assert!(!host_matches("*.example.com", "example.com"));
        assert!(!host_matches("*.example.com", "a.b.example.com"));
        assert!(host_matches("example.com", "example.com."));
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("localhost:80"), "localhost");
        assert_eq!(host_of("[::1]:80"), "::1");
        assert_eq!(host_of("::1"), "::1");
        assert_eq!(host_of("bare"), "bare");
    }

    #[test]
    fn rejects_garbage_pem() {
        let err = Identity::from_pem(b"not a pem", b"", None).unwrap_err();
        assert!(matches!(err, IdentityError::NoCertificates(_)));
    }

    #[test]
    fn missing_key_is_reported() {
        let rcgen::CertifiedKey { cert, .. } = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let err = Identity::from_pem(cert.pem().as_bytes(), cert.pem().as_bytes(), None).unwrap_err();
        assert!(matches!(err, IdentityError::NoPrivateKey(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let config = IdentityConfig {
            cert: PathBuf::from("/nonexistent/cert.pem"),
            key: PathBuf::from("/nonexistent/key.pem"),
            ca: None,
        };
        assert!(matches!(Identity::load(&config), Err(IdentityError::Io { .. })));
    }

    #[test]
    fn version_bounds() {
        assert_eq!(protocol_versions(TlsVersion::Tls12, TlsVersion::Tls13).unwrap().len(), 2);
        assert_eq!(protocol_versions(TlsVersion::Tls10, TlsVersion::Tls12).unwrap().len(), 1);
        assert_eq!(protocol_versions(TlsVersion::Tls13, TlsVersion::Tls13).unwrap().len(), 1);
        assert!(matches!(
            protocol_versions(TlsVersion::Tls10, TlsVersion::Tls11),
            Err(IdentityError::NoProtocolVersions { .. })
        ));
    }

    #[test]
    fn builds_server_config() {
        let identity = self_signed(&["localhost"]);
        let config = identity.server_config(&ServerOptions::default()).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }

    #[test]
    fn builds_verifier_with_client_ca() {
        let ca = rcgen::generate_simple_self_signed(vec!["client-ca".to_string()]).unwrap();
        let leaf = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let identity = Identity::from_pem(
            leaf.cert.pem().as_bytes(),
            leaf.key_pair.serialize_pem().as_bytes(),
            Some(ca.cert.pem().as_bytes()),
        )
        .unwrap();
        assert!(identity.has_client_ca());

        let options = ServerOptions {
            client_auth: ClientAuthPolicy::RequireAndVerifyClientCert,
            ..ServerOptions::default()
        };
        assert!(identity.server_config(&options).is_ok());
    }
}
