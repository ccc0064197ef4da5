//! Test support utilities
//!
//! An in-memory [`Connection`] that records what a hook publishes. Only
//! available with the `test-support` feature.

use crate::connection::Connection;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;

/// A message captured by [`MemoryConnection`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishedMessage {
    /// Subject the message was published to
    pub subject: String,
    /// Raw payload
    pub payload: Bytes,
}

/// Error returned when a [`MemoryConnection`] is told to reject publishes.
#[derive(Debug, Error)]
#[error("publish rejected by memory connection")]
pub struct PublishRejected;

#[derive(Debug, Default)]
struct Inner {
    closed: AtomicBool,
    reject: AtomicBool,
    published: Mutex<Vec<PublishedMessage>>,
}

/// Connection that keeps published messages in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryConnection {
    inner: Arc<Inner>,
}

impl MemoryConnection {
    /// Create an open connection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the connection closed
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    /// Make subsequent publishes fail while the connection still reports open
    pub fn reject_publishes(&self, reject: bool) {
        self.inner.reject.store(reject, Ordering::SeqCst);
    }

    /// Everything published so far, in order
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.published.lock().clone()
    }
}

impl Connection for MemoryConnection {
    type Error = PublishRejected;

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn publish(&self, subject: &str, payload: Bytes) -> Result<(), Self::Error> {
        if self.inner.reject.load(Ordering::SeqCst) {
            return Err(PublishRejected);
        }

        self.inner.published.lock().push(PublishedMessage {
            subject: subject.to_string(),
            payload,
        });

        Ok(())
    }
}
