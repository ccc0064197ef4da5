use crate::config::NatsTlsConfig;
use crate::error::{Error, Result};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_nats::{Client, ConnectOptions, Event};
use tracing::{debug, info};

/// Callback receiving asynchronous connection errors.
pub type ErrorCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// A live NATS connection shared between the caller and any hooks.
///
/// Cloning is cheap; every clone refers to the same client and observes the
/// same closed state.
#[derive(Clone, Debug)]
pub struct NatsConnection {
    client: Client,
    closed: Arc<AtomicBool>,
}

impl NatsConnection {
    /// Wraps an already connected client.
    ///
    /// The wrapper only learns about closure through [`Self::close`].
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Whether the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the connection for every clone, draining pending messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the client could not be drained.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("closing nats connection");

        self.client
            .drain()
            .await
            .map_err(|e| Error::Drain(e.to_string()))
    }
}

impl From<Client> for NatsConnection {
    fn from(client: Client) -> Self {
        Self::from_client(client)
    }
}

/// Connects to the configured servers over mutual TLS.
///
/// Asynchronous errors after the initial connect are not surfaced; use
/// [`connect_with_error_callback`] to receive them.
///
/// # Errors
///
/// Returns a configuration error if the TLS material is unusable, or
/// [`Error::Connect`] if the server list cannot be parsed or no server could
/// be reached.
pub async fn connect(config: &NatsTlsConfig) -> Result<NatsConnection> {
    connect_inner(config, None).await
}

/// Connects to the configured servers over mutual TLS, reporting asynchronous
/// connection errors (disconnects, server and client errors, slow consumers,
/// lame duck mode) to `callback`.
///
/// # Errors
///
/// Returns a configuration error if the TLS material is unusable, or
/// [`Error::Connect`] if the server list cannot be parsed or no server could
/// be reached.
pub async fn connect_with_error_callback<F>(
    config: &NatsTlsConfig,
    callback: F,
) -> Result<NatsConnection>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    connect_inner(config, Some(Arc::new(callback))).await
}

async fn connect_inner(
    config: &NatsTlsConfig,
    callback: Option<ErrorCallback>,
) -> Result<NatsConnection> {
    let tls_config = config.tls_config()?;
    let servers = server_string(config)?;

    let closed = Arc::new(AtomicBool::new(false));
    let event_closed = closed.clone();

    let options = ConnectOptions::new()
        .require_tls(true)
        .tls_client_config(tls_config)
        .event_callback(move |event| {
            let closed = event_closed.clone();
            let callback = callback.clone();
            async move { handle_event(event, &closed, callback.as_deref()) }
        });

    debug!(%servers, "connecting to nats");

    let client = options.connect(servers.as_str()).await?;

    info!(%servers, "connected to nats");

    Ok(NatsConnection { client, closed })
}

fn server_string(config: &NatsTlsConfig) -> Result<String> {
    if config.servers.is_empty() {
        return Err(Error::NoServers);
    }

    Ok(config.server_string())
}

fn handle_event(
    event: Event,
    closed: &AtomicBool,
    callback: Option<&(dyn Fn(Event) + Send + Sync)>,
) {
    match event {
        Event::Closed => {
            closed.store(true, Ordering::Release);
        }
        Event::Disconnected
        | Event::LameDuckMode
        | Event::SlowConsumer(_)
        | Event::ServerError(_)
        | Event::ClientError(_) => {
            if let Some(callback) = callback {
                callback(event);
            }
        }
        _ => {}
    }
}
