use crate::error::{Error, Result};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::ClientConfig;
use rustls::crypto::{CryptoProvider, aws_lc_rs};
use rustls::sign::CertifiedKey;
use rustls::version::{TLS12, TLS13};
use rustls::{InconsistentKeys, RootCertStore, SupportedProtocolVersion};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Protocol versions offered to the server. Nothing below TLS 1.2.
pub static PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] = &[&TLS13, &TLS12];

/// The minimum set of entries needed to connect to NATS over mutual TLS.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct NatsTlsConfig {
    /// PEM files holding the trust anchors. Each file is loaded on its own and
    /// merged into a single root store.
    pub ca_files: Vec<PathBuf>,

    /// PEM file holding the client private key.
    pub key_file: PathBuf,

    /// PEM file holding the client certificate chain.
    pub cert_file: PathBuf,

    /// NATS server URLs.
    pub servers: Vec<String>,
}

impl NatsTlsConfig {
    /// The server list joined into a single comma separated string.
    #[must_use]
    pub fn server_string(&self) -> String {
        self.servers.join(",")
    }

    /// Fields describing this config, suitable for structured logging.
    ///
    /// Only paths are included, never key material.
    #[must_use]
    pub fn log_fields(&self) -> Map<String, Value> {
        let paths = |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|path| Value::String(path.display().to_string()))
                .collect::<Vec<_>>()
        };

        let mut fields = Map::new();
        fields.insert(
            "servers".to_string(),
            Value::Array(self.servers.iter().cloned().map(Value::String).collect()),
        );
        fields.insert("ca_files".to_string(), Value::Array(paths(&self.ca_files)));
        fields.insert(
            "key_file".to_string(),
            Value::String(self.key_file.display().to_string()),
        );
        fields.insert(
            "cert_file".to_string(),
            Value::String(self.cert_file.display().to_string()),
        );
        fields
    }

    /// Builds the rustls client configuration for this config.
    ///
    /// The returned configuration trusts only the configured anchors, presents
    /// the client certificate and refuses anything older than TLS 1.2. It is
    /// rebuilt from disk on every call.
    ///
    /// # Errors
    ///
    /// Returns an error if a trust anchor file is unreadable, holds no
    /// certificate or holds one the root store rejects. Also fails if the
    /// client certificate and key cannot be loaded or do not belong together.
    pub fn tls_config(&self) -> Result<ClientConfig> {
        let provider = Arc::new(aws_lc_rs::default_provider());

        let roots = self.root_store()?;
        let (cert_chain, key) = self.client_identity(&provider)?;

        let config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(PROTOCOL_VERSIONS)?
            .with_root_certificates(roots)
            .with_client_auth_cert(cert_chain, key)?;

        Ok(config)
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();

        for ca_file in &self.ca_files {
            let certs = read_certs(ca_file)?;
            if certs.is_empty() {
                return Err(Error::NoCertificates(ca_file.clone()));
            }

            let added = certs.len();
            for cert in certs {
                roots
                    .add(cert)
                    .map_err(|source| Error::InvalidCertificate {
                        path: ca_file.clone(),
                        source,
                    })?;
            }

            debug!(path = %ca_file.display(), added, "loaded trust anchors");
        }

        Ok(roots)
    }

    fn client_identity(
        &self,
        provider: &CryptoProvider,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let cert_chain = read_certs(&self.cert_file)?;
        if cert_chain.is_empty() {
            return Err(Error::NoCertificates(self.cert_file.clone()));
        }

        let key = read_private_key(&self.key_file)?;

        let signing_key = provider
            .key_provider
            .load_private_key(key.clone_key())
            .map_err(|source| Error::InvalidPrivateKey {
                path: self.key_file.clone(),
                source,
            })?;

        // Providers that cannot expose the public half report `Unknown`; let
        // the handshake catch those.
        match CertifiedKey::new(cert_chain.clone(), signing_key).keys_match() {
            Ok(()) | Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => {}
            Err(_) => {
                return Err(Error::KeyMismatch {
                    cert_file: self.cert_file.clone(),
                    key_file: self.key_file.clone(),
                });
            }
        }

        Ok((cert_chain, key))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let data = read_file(path)?;

    rustls_pemfile::certs(&mut data.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|source| Error::Pem {
            path: path.to_path_buf(),
            source,
        })
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let data = read_file(path)?;

    rustls_pemfile::private_key(&mut data.as_slice())
        .map_err(|source| Error::Pem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| Error::NoPrivateKey(path.to_path_buf()))
}
