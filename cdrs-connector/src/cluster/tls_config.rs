use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::SecurityConfigError;

/// Format of a trust store file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Default, Serialize, Deserialize)]
pub enum TrustStoreType {
    /// One or more PEM encoded certificates.
    #[default]
    #[display("PEM")]
    Pem,
    /// A single DER encoded certificate.
    #[display("DER")]
    Der,
    /// A PKCS#12 archive, optionally password protected.
    #[display("PKCS12")]
    Pkcs12,
}

impl FromStr for TrustStoreType {
    type Err = SecurityConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PEM" => Ok(TrustStoreType::Pem),
            "DER" | "CER" => Ok(TrustStoreType::Der),
            "PKCS12" | "P12" | "PFX" => Ok(TrustStoreType::Pkcs12),
            _ => Err(SecurityConfigError::UnsupportedStoreType(s.to_string())),
        }
    }
}

/// Handshake protocol identifier. `TLS` negotiates the best of the supported versions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, Default, Serialize, Deserialize)]
pub enum TlsProtocol {
    #[default]
    #[display("TLS")]
    Tls,
    #[display("TLSv1.2")]
    TlsV12,
    #[display("TLSv1.3")]
    TlsV13,
}

impl FromStr for TlsProtocol {
    type Err = SecurityConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TLS" => Ok(TlsProtocol::Tls),
            "TLSv1.2" => Ok(TlsProtocol::TlsV12),
            "TLSv1.3" => Ok(TlsProtocol::TlsV13),
            _ => Err(SecurityConfigError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// TLS part of a connection configuration. Enabling TLS without a trust store path selects the
/// default web PKI trust roots.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    pub enabled: bool,
    pub trust_store_path: Option<PathBuf>,
    pub trust_store_type: TrustStoreType,
    pub trust_store_password: Option<String>,
    pub protocol: TlsProtocol,
    pub enabled_cipher_suites: Vec<String>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("enabled", &self.enabled)
            .field("trust_store_path", &self.trust_store_path)
            .field("trust_store_type", &self.trust_store_type)
            .field(
                "trust_store_password",
                &self.trust_store_password.as_ref().map(|_| "***"),
            )
            .field("protocol", &self.protocol)
            .field("enabled_cipher_suites", &self.enabled_cipher_suites)
            .finish()
    }
}

impl TlsConfig {
    /// TLS enabled with default trust, protocol and cipher suites.
    pub fn enabled() -> Self {
        TlsConfig {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn with_trust_store(
        mut self,
        path: impl Into<PathBuf>,
        store_type: TrustStoreType,
        password: Option<String>,
    ) -> Self {
        self.trust_store_path = Some(path.into());
        self.trust_store_type = store_type;
        self.trust_store_password = password;
        self
    }

    pub fn with_protocol(mut self, protocol: TlsProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_cipher_suites<I, S>(mut self, suites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_cipher_suites = suites.into_iter().map(Into::into).collect();
        self
    }
}
