//! Turns a [`TlsConfig`] into a ready to use TLS client context.
//!
//! Trust material is read from a single trust store file, in PEM, DER or PKCS#12 format. The
//! resulting context only verifies the server; client certificates are not supported.
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::crypto::{ring, CryptoProvider};
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::{
    version, ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion,
};
use tracing::*;

use crate::cluster::{TlsConfig, TlsProtocol, TrustStoreType};
use crate::error::SecurityConfigError;

/// Opens trust store files. Each call opens a new handle, which is dropped as soon as the store
/// has been read.
pub trait TrustStoreOpener: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// Opens trust stores from the local filesystem.
#[derive(Debug, Default, Copy, Clone)]
pub struct FsTrustStoreOpener;

impl TrustStoreOpener for FsTrustStoreOpener {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }
}

/// TLS client context along with the settings it was built from.
#[derive(Clone)]
pub struct SecurityOptions {
    client_config: Arc<ClientConfig>,
    cipher_suites: Vec<String>,
    protocol: TlsProtocol,
}

impl fmt::Debug for SecurityOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityOptions")
            .field("cipher_suites", &self.cipher_suites)
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl SecurityOptions {
    /// Context trusting the bundled web PKI roots, with default protocol versions and cipher
    /// suites.
    pub fn default_trust() -> Result<Self, SecurityConfigError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let protocol = TlsProtocol::default();
        let client_config = client_config(ring::default_provider(), protocol, roots)?;

        Ok(SecurityOptions {
            client_config: Arc::new(client_config),
            cipher_suites: vec![],
            protocol,
        })
    }

    #[inline]
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Enabled cipher suites, in preference order. Empty when provider defaults are used.
    #[inline]
    pub fn cipher_suites(&self) -> &[String] {
        &self.cipher_suites
    }

    #[inline]
    pub fn protocol(&self) -> TlsProtocol {
        self.protocol
    }
}

/// Builds a TLS context from the trust store given in the configuration, read from the local
/// filesystem. Returns `None` when no trust store is configured, in which case callers should
/// fall back to [`SecurityOptions::default_trust`].
pub fn build_security_options(
    tls: &TlsConfig,
) -> Result<Option<SecurityOptions>, SecurityConfigError> {
    build_security_options_with(tls, &FsTrustStoreOpener)
}

/// Same as [`build_security_options`], but reads the trust store through given opener.
pub fn build_security_options_with(
    tls: &TlsConfig,
    opener: &dyn TrustStoreOpener,
) -> Result<Option<SecurityOptions>, SecurityConfigError> {
    let Some(path) = tls.trust_store_path.as_deref() else {
        return Ok(None);
    };

    let bytes = {
        let io_error = |source| SecurityConfigError::TrustStoreIo {
            path: path.display().to_string(),
            source,
        };

        let mut store = opener.open(path).map_err(io_error)?;
        let mut bytes = vec![];
        store.read_to_end(&mut bytes).map_err(io_error)?;
        bytes
    };

    let certificates = load_certificates(
        &bytes,
        tls.trust_store_type,
        tls.trust_store_password.as_deref(),
    )?;

    if certificates.is_empty() {
        return Err(SecurityConfigError::NoCertificates);
    }

    let mut roots = RootCertStore::empty();
    for certificate in certificates {
        roots
            .add(certificate)
            .map_err(SecurityConfigError::InvalidCertificate)?;
    }

    debug!(
        path = %path.display(),
        store_type = %tls.trust_store_type,
        roots = roots.len(),
        "Loaded trust store."
    );

    let mut provider = ring::default_provider();
    if !tls.enabled_cipher_suites.is_empty() {
        provider.cipher_suites = select_cipher_suites(&provider, &tls.enabled_cipher_suites)?;
    }

    let client_config = client_config(provider, tls.protocol, roots)?;

    Ok(Some(SecurityOptions {
        client_config: Arc::new(client_config),
        cipher_suites: tls.enabled_cipher_suites.clone(),
        protocol: tls.protocol,
    }))
}

fn load_certificates(
    bytes: &[u8],
    store_type: TrustStoreType,
    password: Option<&str>,
) -> Result<Vec<CertificateDer<'static>>, SecurityConfigError> {
    match store_type {
        TrustStoreType::Pem => rustls_pemfile::certs(&mut io::BufReader::new(bytes))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| SecurityConfigError::MalformedTrustStore(error.to_string())),
        TrustStoreType::Der => Ok(vec![CertificateDer::from(bytes.to_vec())]),
        TrustStoreType::Pkcs12 => {
            let pfx = p12::PFX::parse(bytes)
                .map_err(|error| SecurityConfigError::MalformedTrustStore(format!("{error:?}")))?;

            // unprotected stores are read without an integrity check
            if let Some(password) = password {
                if !pfx.verify_mac(password) {
                    return Err(SecurityConfigError::WrongPassword);
                }
            }

            let certificates = pfx
                .cert_x509_bags(password.unwrap_or_default())
                .map_err(|error| SecurityConfigError::MalformedTrustStore(format!("{error:?}")))?;

            Ok(certificates.into_iter().map(CertificateDer::from).collect())
        }
    }
}

// TLS 1.3 suites are registered as TLS13_*, while their standard names start with TLS_
fn normalize_suite_name(name: &str) -> String {
    let name = name.trim().to_ascii_uppercase();
    if name.starts_with("TLS_AES_") || name.starts_with("TLS_CHACHA20_") {
        name.replacen("TLS_", "TLS13_", 1)
    } else {
        name
    }
}

fn select_cipher_suites(
    provider: &CryptoProvider,
    names: &[String],
) -> Result<Vec<SupportedCipherSuite>, SecurityConfigError> {
    names
        .iter()
        .map(|name| {
            let normalized = normalize_suite_name(name);
            provider
                .cipher_suites
                .iter()
                .find(|suite| format!("{:?}", suite.suite()) == normalized)
                .copied()
                .ok_or_else(|| SecurityConfigError::UnknownCipherSuite(name.clone()))
        })
        .collect()
}

static ALL_VERSIONS: &[&SupportedProtocolVersion] = &[&version::TLS13, &version::TLS12];
static TLS12_ONLY: &[&SupportedProtocolVersion] = &[&version::TLS12];
static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&version::TLS13];

fn protocol_versions(protocol: TlsProtocol) -> &'static [&'static SupportedProtocolVersion] {
    match protocol {
        TlsProtocol::Tls => ALL_VERSIONS,
        TlsProtocol::TlsV12 => TLS12_ONLY,
        TlsProtocol::TlsV13 => TLS13_ONLY,
    }
}

fn client_config(
    provider: CryptoProvider,
    protocol: TlsProtocol,
    roots: RootCertStore,
) -> Result<ClientConfig, SecurityConfigError> {
    Ok(ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(protocol_versions(protocol))
        .map_err(SecurityConfigError::Context)?
        .with_root_certificates(roots)
        .with_no_client_auth())
}
