//! Builds mutually authenticated TLS configuration from PEM material on disk
//! and uses it to connect to a NATS cluster.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod connection;
mod error;

pub use config::{NatsTlsConfig, PROTOCOL_VERSIONS};
pub use connection::{ErrorCallback, NatsConnection, connect, connect_with_error_callback};
pub use error::{Error, Result};
