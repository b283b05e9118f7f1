//! TLS domain construction for AMQP connections
//!
//! A CA bundle switches TLS on. Once it is on, the client must also present a
//! certificate and key (mutual TLS) and the broker certificate is always
//! verified against the supplied CA.

use crate::config::ConfigError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// Validated TLS material for one publish
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    pub trusted_ca: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub verify_peer: bool,
}

/// Builder turning optional `{ca, cert, key}` parameters into a [`TlsConfig`]
#[derive(Debug, Default)]
pub struct TlsDomainBuilder {
    trusted_ca: Option<PathBuf>,
    client_cert: Option<PathBuf>,
    client_key: Option<PathBuf>,
}

impl TlsDomainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trusted_ca(mut self, path: Option<PathBuf>) -> Self {
        self.trusted_ca = path;
        self
    }

    pub fn client_cert(mut self, path: Option<PathBuf>) -> Self {
        self.client_cert = path;
        self
    }

    pub fn client_key(mut self, path: Option<PathBuf>) -> Self {
        self.client_key = path;
        self
    }

    /// Produce the TLS configuration, or `None` when no CA was given.
    ///
    /// This does not touch the filesystem; PEM files are read by
    /// [`TlsConfig::connector`].
    pub fn build(self) -> Result<Option<TlsConfig>, ConfigError> {
        let Some(trusted_ca) = self.trusted_ca else {
            if self.client_cert.is_some() || self.client_key.is_some() {
                warn!("Client certificate supplied without a CA, connecting without TLS");
            }
            return Ok(None);
        };

        match (self.client_cert, self.client_key) {
            (Some(client_cert), Some(client_key)) => Ok(Some(TlsConfig {
                trusted_ca,
                client_cert,
                client_key,
                verify_peer: true,
            })),
            _ => Err(ConfigError::IncompleteTls),
        }
    }
}

impl TlsConfig {
    /// Build a rustls client configuration presenting the client certificate
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        if !self.verify_peer {
            return Err(tls_error(
                &self.trusted_ca,
                "connections without peer verification are not supported",
            ));
        }

        let mut roots = RootCertStore::empty();
        for cert in load_certs(&self.trusted_ca)? {
            roots
                .add(cert)
                .map_err(|e| tls_error(&self.trusted_ca, &e.to_string()))?;
        }

        let chain = load_certs(&self.client_cert)?;
        let key = load_private_key(&self.client_key)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| tls_error(&self.trusted_ca, &e.to_string()))?
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)
            .map_err(|e| tls_error(&self.client_key, &e.to_string()))?;

        debug!(
            ca = %self.trusted_ca.display(),
            cert = %self.client_cert.display(),
            "Built mutual TLS client configuration"
        );
        Ok(config)
    }

    /// Connector handed to the AMQP client for `amqps` connections
    pub fn connector(&self) -> Result<TlsConnector, ConfigError> {
        Ok(TlsConnector::from(Arc::new(self.client_config()?)))
    }
}

fn tls_error(path: &Path, reason: &str) -> ConfigError {
    ConfigError::TlsMaterial {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn open_pem(path: &Path) -> Result<BufReader<File>, ConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| tls_error(path, &e.to_string()))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let mut reader = open_pem(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(path, &e.to_string()))?;

    if certs.is_empty() {
        return Err(tls_error(path, "no certificates found"));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| tls_error(path, &e.to_string()))?
        .ok_or_else(|| tls_error(path, "no private key found"))
}
