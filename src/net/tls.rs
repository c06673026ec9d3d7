//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load the server certificate chain and private key (PEM)
//! - Optionally load a trusted CA bundle for client certificate verification
//! - Produce an immutable [`TlsPolicy`], or none at all
//!
//! # Design Decisions
//! - Failure to load key material is never fatal: the server falls back to
//!   plaintext and says so in the log
//! - A broken CA bundle only drops client verification, not TLS itself
//! - Client certificates are required iff the trust pool holds at least one CA

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsSettings;
use crate::observability::logging::error_chain;

/// Client certificate requirement of a [`TlsPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// Clients are not asked for a certificate.
    NotRequired,
    /// Clients must present a certificate signed by a trusted CA.
    RequireAndVerify,
}

/// Loaded, immutable transport security policy.
#[derive(Debug, Clone)]
pub struct TlsPolicy {
    config: Arc<ServerConfig>,
    client_auth: ClientAuth,
}

impl TlsPolicy {
    /// Client certificate requirement.
    pub fn client_auth(&self) -> ClientAuth {
        self.client_auth
    }

    /// The rustls server configuration.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.config)
    }

    /// Acceptor performing the server side of the handshake.
    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.server_config())
    }
}

/// Errors raised while loading key material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("no {0} path configured")]
    MissingPath(&'static str),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("invalid TLS configuration")]
    Rustls(#[from] rustls::Error),

    #[error("failed to build client certificate verifier")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Build the transport security policy for `settings`.
///
/// Returns `None` when TLS is not requested or the certificate/key pair
/// cannot be loaded; the latter is logged as a warning.
pub fn build_tls_policy(settings: &TlsSettings) -> Option<TlsPolicy> {
    let policy = if settings.enabled {
        match load_policy(settings) {
            Ok(policy) => Some(policy),
            Err(e) => {
                tracing::warn!(
                    error = %error_chain(&e),
                    "Failed to load TLS certificate, falling back to plaintext"
                );
                None
            }
        }
    } else {
        None
    };

    match &policy {
        Some(policy) => tracing::info!(
            client_auth = ?policy.client_auth(),
            "Secure connection is enabled"
        ),
        None => tracing::warn!("Secure connection is NOT ENABLED"),
    }
    policy
}

fn load_policy(settings: &TlsSettings) -> Result<TlsPolicy, TlsError> {
    let cert_path = settings
        .cert_path
        .as_deref()
        .ok_or(TlsError::MissingPath("certificate"))?;
    let key_path = settings
        .key_path
        .as_deref()
        .ok_or(TlsError::MissingPath("private key"))?;

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let roots = settings
        .ca_path
        .as_deref()
        .and_then(|ca_path| match load_trust_pool(ca_path) {
            Ok(roots) => Some(roots),
            Err(e) => {
                tracing::warn!(
                    error = %error_chain(&e),
                    "Failed to load CA bundle, client certificates will not be verified"
                );
                None
            }
        });

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let (config, client_auth) = match roots {
        Some(roots) => {
            let verifier = client_verifier(roots, provider)?;
            let config = builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)?;
            (config, ClientAuth::RequireAndVerify)
        }
        None => {
            let config = builder.with_no_client_auth().with_single_cert(certs, key)?;
            (config, ClientAuth::NotRequired)
        }
    };

    Ok(TlsPolicy {
        config: Arc::new(config),
        client_auth,
    })
}

fn client_verifier(
    roots: RootCertStore,
    provider: Arc<CryptoProvider>,
) -> Result<Arc<dyn rustls::server::danger::ClientCertVerifier>, TlsError> {
    Ok(WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider).build()?)
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Load every certificate from a PEM file.
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Load a CA bundle. Unparsable entries are skipped; an empty pool is an error.
fn load_trust_pool(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut reader = open(path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .filter_map(Result::ok)
        .collect();

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    tracing::debug!(added, ignored, path = %path.display(), "Loaded CA bundle");

    if roots.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(roots)
}
