//! Authentication strategy resolution
//!
//! Turns the environment inputs (broker URL, JWT, home directory, working
//! directory) into a finalized [`ConnectionConfig`]. Exactly one [`AuthMode`] is
//! selected, first match wins:
//!
//! 1. URL + JWT → [`AuthMode::Jwt`]
//! 2. URL with a TLS scheme → [`AuthMode::Certificate`] (degrades to
//!    [`AuthMode::ExplicitUrl`] over TLS when the client certificate cannot be read)
//! 3. URL with a plain scheme → [`AuthMode::ExplicitUrl`]
//! 4. nothing usable → [`AuthMode::Capability`], which fails fatally when the package
//!    metadata or the password file cannot be read
//!
//! Resolution performs local file reads only, never network I/O.

use crate::config::{CapabilitySection, CliConfig};
use crate::transport::mqtt::BackoffPolicy;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

const CERT_FILE: &str = "client.crt";
const KEY_FILE: &str = "client.key";
const CA_FILE: &str = "ca.crt";
const MANIFEST_FILE: &str = "Cargo.toml";
const PASSWORD_FILE: &str = "password";

/// Credential strategy, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Operator-supplied URL, no forced credential shape
    ExplicitUrl,
    /// TLS client certificate loaded from the certificate directory
    Certificate,
    /// Signed token: username carries the decoded claims, password the raw token
    Jwt,
    /// Local fallback derived from package metadata and a stored password
    Capability,
}

/// MQTT protocol revision used for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// MQTT 5, required for retain-as-published subscriptions
    V5,
    /// MQTT 3.1.1, used against the local fallback broker
    V311,
}

/// Client certificate material, loaded once and immutable afterwards
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub ca: Vec<u8>,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("ca_bytes", &self.ca.len())
            .field("cert_bytes", &self.cert.len())
            .field("key", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSetting {
    Disabled,
    /// TLS with the transport's default root store and no client certificate
    DefaultRoots,
    ClientCertificate(CertificateBundle),
}

/// Finalized connection parameters handed to the session
#[derive(Clone)]
pub struct ConnectionConfig {
    pub mode: AuthMode,
    pub host: String,
    pub port: u16,
    pub tls: TlsSetting,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub protocol: ProtocolVersion,
    pub keep_alive: Duration,
    /// Bounds for the delay injected before every connection attempt
    pub backoff: BackoffPolicy,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("mode", &self.mode)
            .field("broker", &self.broker_url())
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("client_id", &self.client_id)
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn uses_tls(&self) -> bool {
        !matches!(self.tls, TlsSetting::Disabled)
    }

    pub fn broker_url(&self) -> String {
        let scheme = if self.uses_tls() { "mqtts" } else { "mqtt" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Granularity used to derive the version namespace from a semantic version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionNamespace {
    Major,
    Minor,
    #[default]
    Patch,
}

impl VersionNamespace {
    fn components(self) -> usize {
        match self {
            VersionNamespace::Major => 1,
            VersionNamespace::Minor => 2,
            VersionNamespace::Patch => 3,
        }
    }
}

/// Whether a failed local read aborts resolution or is logged and skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    Required,
    Optional,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid JWT: {reason}")]
    InvalidJwt { reason: String },
    #[error("Failed to read {}: {source}", path.display())]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid package metadata in {}: {reason}", path.display())]
    InvalidMetadata { path: PathBuf, reason: String },
    #[error("HOME is not set, cannot locate the capability password")]
    MissingHome,
    #[error("No authentication method found: {0}")]
    NoAuthMethod(#[source] Box<AuthError>),
}

/// Environment inputs consumed by the resolver
#[derive(Debug, Clone, Default)]
pub struct AuthInputs {
    pub broker_url: Option<String>,
    pub jwt: Option<String>,
    pub home: Option<PathBuf>,
    pub working_dir: PathBuf,
}

impl AuthInputs {
    /// Blank values count as absent
    fn url(&self) -> Option<&str> {
        self.broker_url.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn token(&self) -> Option<&str> {
        self.jwt.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Resolves the credential strategy from local inputs
#[derive(Debug, Clone)]
pub struct AuthResolver {
    cert_dir: PathBuf,
    capability: CapabilitySection,
    keep_alive: Duration,
    backoff: BackoffPolicy,
}

impl AuthResolver {
    pub fn new(config: &CliConfig) -> Self {
        Self {
            cert_dir: config.tls.cert_dir.clone(),
            capability: config.capability.clone(),
            keep_alive: config.keep_alive(),
            backoff: BackoffPolicy::from(&config.reconnect),
        }
    }

    pub fn resolve(&self, inputs: &AuthInputs) -> Result<ConnectionConfig, AuthError> {
        let config = match (inputs.url(), inputs.token()) {
            (Some(url), Some(token)) => self.resolve_jwt(url, token)?,
            (Some(url), None) => self.resolve_explicit(url, &inputs.working_dir)?,
            (None, jwt) => {
                if jwt.is_some() {
                    warn!("JWT supplied without a broker URL, ignoring it");
                }
                self.resolve_capability(inputs)
                    .map_err(|e| AuthError::NoAuthMethod(Box::new(e)))?
            }
        };

        info!(
            mode = ?config.mode,
            broker = %config.broker_url(),
            protocol = ?config.protocol,
            "Resolved authentication method"
        );
        Ok(config)
    }

    fn base_config(&self, mode: AuthMode, endpoint: BrokerEndpoint) -> ConnectionConfig {
        ConnectionConfig {
            mode,
            host: endpoint.host,
            port: endpoint.port,
            tls: if endpoint.tls {
                TlsSetting::DefaultRoots
            } else {
                TlsSetting::Disabled
            },
            username: None,
            password: None,
            client_id: None,
            protocol: ProtocolVersion::V5,
            keep_alive: self.keep_alive,
            backoff: self.backoff,
        }
    }

    fn resolve_jwt(&self, url: &str, token: &str) -> Result<ConnectionConfig, AuthError> {
        let endpoint = parse_broker_url(url)?;
        let claims = decode_jwt_claims(token)?;
        let id = claims.get("id").cloned().unwrap_or(Value::Null);

        let mut config = self.base_config(AuthMode::Jwt, endpoint);
        config.username = Some(json!({ "id": id, "payload": claims }).to_string());
        config.password = Some(token.to_string());
        Ok(config)
    }

    fn resolve_explicit(
        &self,
        url: &str,
        working_dir: &Path,
    ) -> Result<ConnectionConfig, AuthError> {
        let endpoint = parse_broker_url(url)?;
        if !endpoint.tls {
            return Ok(self.base_config(AuthMode::ExplicitUrl, endpoint));
        }

        let dir = working_dir.join(&self.cert_dir);
        match load_certificate_bundle(&dir)? {
            Some(bundle) => {
                debug!("Loaded client certificate from {}", dir.display());
                let mut config = self.base_config(AuthMode::Certificate, endpoint);
                config.tls = TlsSetting::ClientCertificate(bundle);
                Ok(config)
            }
            None => {
                warn!(
                    "No client certificate in {}, connecting without one",
                    dir.display()
                );
                Ok(self.base_config(AuthMode::ExplicitUrl, endpoint))
            }
        }
    }

    fn resolve_capability(&self, inputs: &AuthInputs) -> Result<ConnectionConfig, AuthError> {
        let manifest_path = inputs.working_dir.join(MANIFEST_FILE);
        let package = read_package_metadata(&manifest_path)?;
        let namespace = version_namespace(&package.version, package.granularity)
            .ok_or_else(|| AuthError::InvalidMetadata {
                path: manifest_path.clone(),
                reason: format!("unparseable version '{}'", package.version),
            })?;

        let home = inputs.home.as_ref().ok_or(AuthError::MissingHome)?;
        let password_path = home
            .join(&self.capability.credentials_dir)
            .join(&package.name)
            .join(PASSWORD_FILE);
        let password = read_local_file(&password_path, ReadPolicy::Required)?
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
            .unwrap_or_default();

        let endpoint = BrokerEndpoint {
            host: self.capability.host.clone(),
            port: self.capability.port,
            tls: false,
        };
        let mut config = self.base_config(AuthMode::Capability, endpoint);
        config.client_id = Some(format!("{}/{}", package.name, namespace));
        config.username = Some(json!({ "version": package.version }).to_string());
        config.password = Some(password);
        // The local broker does not speak MQTT 5
        config.protocol = ProtocolVersion::V311;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BrokerEndpoint {
    host: String,
    port: u16,
    tls: bool,
}

fn parse_broker_url(raw: &str) -> Result<BrokerEndpoint, AuthError> {
    let url = Url::parse(raw).map_err(|_| AuthError::InvalidBrokerUrl(raw.to_string()))?;
    let tls = match url.scheme() {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" | "tls" => true,
        _ => return Err(AuthError::InvalidBrokerUrl(raw.to_string())),
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AuthError::InvalidBrokerUrl(raw.to_string()))?
        .to_string();
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });
    Ok(BrokerEndpoint { host, port, tls })
}

/// Decode the claims segment of a JWT without verifying the signature
pub fn decode_jwt_claims(token: &str) -> Result<Value, AuthError> {
    let mut segments = token.split('.');
    let claims_segment = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(claims), Some(_)) if segments.next().is_none() => claims,
        _ => {
            return Err(AuthError::InvalidJwt {
                reason: "expected three dot-separated segments".to_string(),
            })
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(claims_segment.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidJwt {
            reason: format!("claims are not base64url: {e}"),
        })?;
    let claims: Value = serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidJwt {
        reason: format!("claims are not JSON: {e}"),
    })?;

    if !claims.is_object() {
        return Err(AuthError::InvalidJwt {
            reason: "claims must be a JSON object".to_string(),
        });
    }
    Ok(claims)
}

/// Truncate a semantic version to the requested number of components.
/// Pre-release and build suffixes are dropped.
pub fn version_namespace(version: &str, granularity: VersionNamespace) -> Option<String> {
    let core = version.split(['-', '+']).next()?.trim();
    if core.is_empty() {
        return None;
    }
    let parts: Vec<&str> = core.split('.').collect();
    if parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    Some(
        parts
            .into_iter()
            .take(granularity.components())
            .collect::<Vec<_>>()
            .join("."),
    )
}

/// Read a local file under an explicit policy: required reads fail, optional
/// reads log and yield `None`
pub fn read_local_file(path: &Path, policy: ReadPolicy) -> Result<Option<Vec<u8>>, AuthError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(source) => match policy {
            ReadPolicy::Required => Err(AuthError::UnreadableFile {
                path: path.to_path_buf(),
                source,
            }),
            ReadPolicy::Optional => {
                warn!("Skipping {}: {}", path.display(), source);
                Ok(None)
            }
        },
    }
}

fn load_certificate_bundle(dir: &Path) -> Result<Option<CertificateBundle>, AuthError> {
    let cert = read_local_file(&dir.join(CERT_FILE), ReadPolicy::Optional)?;
    let key = read_local_file(&dir.join(KEY_FILE), ReadPolicy::Optional)?;
    let ca = read_local_file(&dir.join(CA_FILE), ReadPolicy::Optional)?;

    Ok(match (ca, cert, key) {
        (Some(ca), Some(cert), Some(key)) => Some(CertificateBundle { ca, cert, key }),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
struct Manifest {
    package: ManifestPackage,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    name: String,
    version: String,
    #[serde(default)]
    metadata: Option<ManifestMetadata>,
}

#[derive(Debug, Deserialize)]
struct ManifestMetadata {
    #[serde(default)]
    capability: Option<CapabilityMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CapabilityMetadata {
    #[serde(default)]
    version_namespace: VersionNamespace,
}

/// Package identity used by capability mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub granularity: VersionNamespace,
}

pub fn read_package_metadata(path: &Path) -> Result<PackageMetadata, AuthError> {
    let bytes = read_local_file(path, ReadPolicy::Required)?.unwrap_or_default();
    let text = String::from_utf8(bytes).map_err(|e| AuthError::InvalidMetadata {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let manifest: Manifest = toml::from_str(&text).map_err(|e| AuthError::InvalidMetadata {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let granularity = manifest
        .package
        .metadata
        .and_then(|m| m.capability)
        .map(|c| c.version_namespace)
        .unwrap_or_default();

    Ok(PackageMetadata {
        name: manifest.package.name,
        version: manifest.package.version,
        granularity,
    })
}
