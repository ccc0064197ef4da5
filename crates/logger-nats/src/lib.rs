//! Publishes structured log events to a NATS subject.
//!
//! A [`NatsHook`] enriches each event with fixed and generated fields,
//! formats it (JSON by default) and publishes it over a shared
//! [`NatsConnection`]. [`HookLayer`] plugs any [`Hook`] into a `tracing`
//! subscriber, and [`install`] wires the whole thing up from a [`HookConfig`].
//!
//! Publishing is fire-and-forget: nothing is retried or buffered, and a
//! closed or failing connection turns into a per-event error.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod connection;
mod error;
mod event;
mod formatter;
mod hook;
mod install;
mod layer;
mod level;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use connection::{Connection, PublishError};
pub use error::{Error, Result};
pub use event::LogEvent;
pub use formatter::{FieldKey, FormatError, Formatter, JsonFormatter};
pub use hook::{FieldGenerator, Hook, NatsHook};
pub use install::{HookConfig, install, install_with_error_callback};
pub use layer::{ErrorHandler, HookLayer};
pub use level::{Level, ParseLevelError};

pub use proven_nats_tls::{NatsConnection, NatsTlsConfig};
