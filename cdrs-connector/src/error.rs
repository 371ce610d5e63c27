//! Errors raised while turning a configuration into a live cluster connection.
//!
//! Each stage has its own error type: [`ConfigurationError`] while validating options,
//! [`SecurityConfigError`] while provisioning TLS trust material and [`ConnectionError`] while
//! talking to the cluster. [`Error`] wraps all of them for callers which only care that the
//! factory failed.
use derive_more::Display;
use std::io;
use std::result;
use thiserror::Error as ThisError;

use cdrs_connector_protocol::error::Error as ProtocolError;

pub type Result<T> = result::Result<T, Error>;

/// Invalid or inconsistent connection options.
#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("No contact hosts configured")]
    NoContactHosts,
    #[error("Invalid port: {0}")]
    InvalidPort(i64),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
    #[error("Minimum reconnection delay {min_ms}ms exceeds maximum {max_ms}ms")]
    ReconnectionDelayRange { min_ms: u64, max_ms: u64 },
    #[error("Unknown connection factory: {0}")]
    UnknownFactory(String),
    #[error("Unknown connection options: {}", .0.join(", "))]
    UnknownProperties(Vec<String>),
    #[error("Malformed connector settings: {0}")]
    MalformedSettings(String),
}

/// Failure to turn a trust store into a TLS client context. Never recovered by falling back to
/// plaintext.
#[derive(Debug, ThisError)]
pub enum SecurityConfigError {
    #[error("Cannot read trust store {path}: {source}")]
    TrustStoreIo {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Malformed trust store: {0}")]
    MalformedTrustStore(String),
    #[error("Trust store password is incorrect or the store is tampered with")]
    WrongPassword,
    #[error("Trust store contains no certificates")]
    NoCertificates,
    #[error("Invalid certificate in trust store: {0}")]
    InvalidCertificate(#[source] tokio_rustls::rustls::Error),
    #[error("Unsupported trust store type: {0}")]
    UnsupportedStoreType(String),
    #[error("Unsupported TLS protocol: {0}")]
    UnsupportedProtocol(String),
    #[error("Unknown cipher suite: {0}")]
    UnknownCipherSuite(String),
    #[error("Cannot build TLS context: {0}")]
    Context(#[source] tokio_rustls::rustls::Error),
}

/// Stage of connection establishment which failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum ConnectionPhase {
    Resolve,
    Connect,
    TlsHandshake,
    Startup,
    Authentication,
}

/// Failure to reach or set up a connection with a cluster node.
#[derive(Debug, ThisError)]
#[error("{phase} failed for {host}: {source}")]
pub struct ConnectionError {
    pub host: String,
    pub phase: ConnectionPhase,
    #[source]
    pub source: ProtocolError,
}

impl ConnectionError {
    pub fn new(host: impl Into<String>, phase: ConnectionPhase, source: ProtocolError) -> Self {
        ConnectionError {
            host: host.into(),
            phase,
            source,
        }
    }

    #[inline]
    pub fn is_authentication(&self) -> bool {
        self.phase == ConnectionPhase::Authentication
    }
}

/// Umbrella error returned by connection factories.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Security configuration error: {0}")]
    Security(#[from] SecurityConfigError),
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
