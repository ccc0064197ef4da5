use std::path::PathBuf;

use thiserror::Error;

/// Result type used by the connector.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building TLS material or connecting.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach any of the configured servers.
    #[error("failed to connect to nats: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// The client could not be drained while closing.
    #[error("failed to drain nats connection: {0}")]
    Drain(String),

    /// A trust anchor could not be added to the root store.
    #[error("invalid certificate in {path}: {source}")]
    InvalidCertificate {
        /// The trust anchor file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rustls::Error,
    },

    /// The private key was rejected by the crypto provider.
    #[error("unsupported private key in {path}: {source}")]
    InvalidPrivateKey {
        /// The key file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rustls::Error,
    },

    /// The private key does not belong to the client certificate.
    #[error("private key in {key_file} does not match certificate in {cert_file}")]
    KeyMismatch {
        /// The certificate file.
        cert_file: PathBuf,
        /// The key file.
        key_file: PathBuf,
    },

    /// A PEM file held no usable certificate.
    #[error("failed to add cert at {0}")]
    NoCertificates(PathBuf),

    /// A PEM file held no private key.
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// No servers were configured.
    #[error("no nats servers configured")]
    NoServers,

    /// A PEM file could not be decoded.
    #[error("failed to parse PEM in {path}: {source}")]
    Pem {
        /// The file being parsed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadFile {
        /// The file being read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// rustls refused the assembled configuration.
    #[error("tls configuration rejected: {0}")]
    Tls(#[from] rustls::Error),
}

impl Error {
    /// Whether the error comes from bad configuration rather than the network.
    ///
    /// Configuration errors are detected before any connection attempt is made.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        !matches!(self, Self::Connect(_) | Self::Drain(_))
    }
}
