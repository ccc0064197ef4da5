use crate::formatter::FormatError;

use thiserror::Error;

/// Result type used by the hook.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while firing or installing the hook.
#[derive(Debug, Error)]
pub enum Error {
    /// The bound connection reports itself closed.
    #[error("attempted to log on a closed connection")]
    ClosedConnection,

    /// Connecting, or building the TLS configuration, failed.
    #[error(transparent)]
    Connector(#[from] proven_nats_tls::Error),

    /// The hook was configured without a subject.
    #[error("must provide a subject for the nats hook")]
    EmptySubject,

    /// The transport rejected the publish.
    #[error("failed to publish log event: {0}")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The event could not be serialized.
    #[error("failed to serialize log event: {0}")]
    Serialization(#[from] FormatError),

    /// A global subscriber was already installed.
    #[error("could not set global default subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}
