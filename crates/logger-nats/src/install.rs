use crate::error::{Error, Result};
use crate::hook::NatsHook;
use crate::layer::HookLayer;

use std::sync::Arc;

use async_nats::Event;
use proven_nats_tls::{NatsConnection, NatsTlsConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, filter, fmt};

/// Everything needed to connect to NATS and install the hook.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct HookConfig {
    /// Connection settings.
    #[serde(flatten)]
    pub nats: NatsTlsConfig,

    /// Subject every event is published to. Must not be empty.
    pub subject: String,

    /// Fixed fields added to every event.
    pub dimensions: Map<String, Value>,

    /// Also print events at `INFO` and above to stderr. Off by default.
    pub stderr: bool,
}

/// Connects to NATS, builds a hook carrying the configured dimensions and
/// installs it as part of the global tracing subscriber.
///
/// The hook layer is the only layer installed unless [`HookConfig::stderr`]
/// asks for a console layer as well. The connection and hook are returned so the caller can manage their
/// lifecycle; the hook never closes the connection.
///
/// # Errors
///
/// Returns [`Error::EmptySubject`] before any connection attempt if no
/// subject is configured, a connector error if TLS material is unusable or
/// no server is reachable, and [`Error::SetGlobalDefault`] if a global
/// subscriber is already installed.
pub async fn install(config: &HookConfig) -> Result<(NatsConnection, Arc<NatsHook>)> {
    check_subject(config)?;

    let connection = proven_nats_tls::connect(&config.nats).await?;

    register(config, connection)
}

/// Like [`install`], reporting asynchronous connection errors to `callback`.
///
/// # Errors
///
/// See [`install`].
pub async fn install_with_error_callback<F>(
    config: &HookConfig,
    callback: F,
) -> Result<(NatsConnection, Arc<NatsHook>)>
where
    F: Fn(Event) + Send + Sync + 'static,
{
    check_subject(config)?;

    let connection = proven_nats_tls::connect_with_error_callback(&config.nats, callback).await?;

    register(config, connection)
}

fn check_subject(config: &HookConfig) -> Result<()> {
    if config.subject.is_empty() {
        return Err(Error::EmptySubject);
    }

    Ok(())
}

fn register(
    config: &HookConfig,
    connection: NatsConnection,
) -> Result<(NatsConnection, Arc<NatsHook>)> {
    let hook = Arc::new(NatsHook::new(connection.clone(), config.subject.clone()));
    hook.add_fields(config.dimensions.clone());

    let console = config.stderr.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter::LevelFilter::INFO)
    });

    let subscriber = tracing_subscriber::registry()
        .with(console)
        .with(HookLayer::new(hook.clone()));

    tracing::subscriber::set_global_default(subscriber)?;

    info!(subject = %config.subject, "nats log hook installed");

    Ok((connection, hook))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    #[test]
    fn test_deserialize_flattened_config() {
        let config: HookConfig = serde_json::from_str(
            r#"{
                "ca_files": ["/etc/nats/ca.pem"],
                "key_file": "/etc/nats/client-key.pem",
                "cert_file": "/etc/nats/client.pem",
                "servers": ["tls://nats-1:4222"],
                "subject": "logs.api",
                "dimensions": {"service": "api", "replica": 3}
            }"#,
        )
        .unwrap();

        assert_eq!(config.subject, "logs.api");
        assert_eq!(config.nats.ca_files, vec![PathBuf::from("/etc/nats/ca.pem")]);
        assert_eq!(config.nats.server_string(), "tls://nats-1:4222");
        assert_eq!(config.dimensions["service"], "api");
        assert_eq!(config.dimensions["replica"], 3);
        assert!(!config.stderr);
    }

    #[test]
    fn test_stderr_layer_is_opt_in() {
        let config: HookConfig =
            serde_json::from_str(r#"{"subject": "logs", "stderr": true}"#).unwrap();

        assert!(config.stderr);
        assert!(!HookConfig::default().stderr);
    }

    #[test]
    fn test_missing_subject_defaults_to_empty() {
        let config: HookConfig = serde_json::from_str(r#"{"servers": []}"#).unwrap();

        assert!(matches!(check_subject(&config), Err(Error::EmptySubject)));
    }

    #[tokio::test]
    async fn test_empty_subject_rejected_before_connecting() {
        // Unreadable TLS material would fail the connect; the subject check
        // has to come first.
        let config = HookConfig {
            nats: NatsTlsConfig {
                ca_files: vec![PathBuf::from("/nonexistent/ca.pem")],
                ..NatsTlsConfig::default()
            },
            subject: String::new(),
            ..HookConfig::default()
        };

        assert!(matches!(install(&config).await, Err(Error::EmptySubject)));
    }

    #[tokio::test]
    async fn test_connector_errors_propagate() {
        let config = HookConfig {
            nats: NatsTlsConfig {
                ca_files: vec![PathBuf::from("/nonexistent/ca.pem")],
                servers: vec!["tls://127.0.0.1:4222".to_string()],
                ..NatsTlsConfig::default()
            },
            subject: "logs".to_string(),
            ..HookConfig::default()
        };

        let err = install(&config).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Connector(proven_nats_tls::Error::ReadFile { .. })
        ));
    }
}
