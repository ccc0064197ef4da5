//! End-to-end test against a running NATS server

use std::time::Duration;

use futures::StreamExt;
use proven_logger_nats::{Error, Hook, Level, LogEvent, NatsConnection, NatsHook};
use serde_json::{Map, Value};
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires a nats-server listening on NATS_URL (default localhost:4222)
async fn test_simple_send_to_server() {
    let url = std::env::var("NATS_URL").unwrap_or_else(|_| "localhost:4222".to_string());

    let client = async_nats::connect(url).await.unwrap();
    let mut subscriber = client.subscribe("test").await.unwrap();
    client.flush().await.unwrap();

    let connection = NatsConnection::from_client(client);
    let hook = NatsHook::new(connection.clone(), "test");

    hook.add_field("hook-level", "pikachu")
        .add_dynamic_field("dynamic-level", || 12);

    let mut event =
        LogEvent::new(Level::Info, "this is a test").with_field("instance-level", "charizard");
    hook.fire(&mut event).unwrap();

    let message = timeout(Duration::from_secs(60), subscriber.next())
        .await
        .unwrap()
        .unwrap();
    let parsed: Map<String, Value> = serde_json::from_slice(&message.payload).unwrap();

    assert_eq!(parsed.len(), 6);
    for fields in [&event.fields, &parsed] {
        assert_eq!(fields["hook-level"], "pikachu");
        assert_eq!(fields["instance-level"], "charizard");
        assert_eq!(fields["dynamic-level"], 12);
    }
    assert_eq!(parsed["msg"], "this is a test");
    assert_eq!(parsed["level"], "info");

    connection.close().await.unwrap();

    assert!(matches!(
        hook.fire(&mut event),
        Err(Error::ClosedConnection)
    ));
}
