use std::error::Error as StdError;
use std::fmt::Debug;

use bytes::Bytes;
use futures::FutureExt;
use proven_nats_tls::NatsConnection;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};

/// The slice of a bus connection a hook needs.
///
/// Implementations must be safe to publish on from many threads at once.
pub trait Connection: Clone + Debug + Send + Sync + 'static {
    /// Error returned when a publish is rejected.
    type Error: StdError + Send + Sync + 'static;

    /// Whether the connection has been closed.
    fn is_closed(&self) -> bool;

    /// Sends `payload` to `subject`. Returns once the message is handed to the
    /// transport, not when it is delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport refuses the message.
    fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Self::Error>;
}

/// Errors publishing through a [`NatsConnection`].
#[derive(Debug, Error)]
pub enum PublishError {
    /// The client's command channel is full and the calling thread is the
    /// only one that could drain it.
    #[error("nats command channel is full on a current-thread runtime")]
    ChannelFull,

    /// The client rejected the message.
    #[error(transparent)]
    Nats(#[from] async_nats::client::PublishError),
}

impl Connection for NatsConnection {
    type Error = PublishError;

    fn is_closed(&self) -> bool {
        Self::is_closed(self)
    }

    /// Hands the message to the client's command channel.
    ///
    /// The send runs outside tokio's cooperative budget, so firing many events
    /// from one task without yielding never stalls. On a current-thread
    /// runtime a full channel is reported as [`PublishError::ChannelFull`]
    /// instead of blocking the thread the client needs to make progress.
    /// Elsewhere a full channel blocks until the client drains it.
    fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Self::Error> {
        let publish =
            tokio::task::unconstrained(self.client().publish(subject.to_string(), payload));

        if on_current_thread_runtime() {
            return match publish.now_or_never() {
                Some(result) => result.map_err(PublishError::from),
                None => Err(PublishError::ChannelFull),
            };
        }

        futures::executor::block_on(publish).map_err(PublishError::from)
    }
}

fn on_current_thread_runtime() -> bool {
    Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::CurrentThread)
}
