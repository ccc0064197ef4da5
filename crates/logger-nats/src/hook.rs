use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::formatter::{Formatter, JsonFormatter};
use crate::{Level, LogEvent};

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use proven_nats_tls::NatsConnection;
use serde_json::{Map, Value};

/// Produces the value of a dynamic field. Called once per fired event.
pub type FieldGenerator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Something a logging pipeline calls for every event at one of its levels.
pub trait Hook: Send + Sync + 'static {
    /// Handle an event. May add fields to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be handled. The pipeline
    /// reports it and carries on.
    fn fire(&self, event: &mut LogEvent) -> Result<()>;

    /// The levels this hook wants to see.
    fn levels(&self) -> Vec<Level>;
}

impl<H: Hook + ?Sized> Hook for Arc<H> {
    fn fire(&self, event: &mut LogEvent) -> Result<()> {
        (**self).fire(event)
    }

    fn levels(&self) -> Vec<Level> {
        (**self).levels()
    }
}

/// Publishes every fired event to a fixed NATS subject.
///
/// The connection is shared with the caller, who stays responsible for
/// closing it. Configuration may be changed at any time; each fire sees a
/// consistent view of every map it reads.
pub struct NatsHook<C = NatsConnection>
where
    C: Connection,
{
    connection: C,
    subject: String,
    extra_fields: RwLock<Map<String, Value>>,
    dynamic_fields: RwLock<HashMap<String, FieldGenerator>>,
    formatter: RwLock<Arc<dyn Formatter>>,
    levels: RwLock<Vec<Level>>,
}

impl<C> NatsHook<C>
where
    C: Connection,
{
    /// Creates a hook publishing to `subject` over `connection`.
    ///
    /// Uses the JSON formatter and listens to [`Level::all`]. The subject is
    /// not validated here.
    pub fn new(connection: C, subject: impl Into<String>) -> Self {
        Self {
            connection,
            subject: subject.into(),
            extra_fields: RwLock::new(Map::new()),
            dynamic_fields: RwLock::new(HashMap::new()),
            formatter: RwLock::new(Arc::new(JsonFormatter::default())),
            levels: RwLock::new(Level::all()),
        }
    }

    /// Adds a field with a fixed value to every event.
    pub fn add_field(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.extra_fields.write().insert(key.into(), value.into());
        self
    }

    /// Adds several fixed fields at once.
    pub fn add_fields<I, K, V>(&self, fields: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut extra_fields = self.extra_fields.write();
        for (key, value) in fields {
            extra_fields.insert(key.into(), value.into());
        }
        drop(extra_fields);
        self
    }

    /// Adds a field whose value is produced by `generator` on every fire.
    ///
    /// Dynamic fields are applied after fixed ones and win on a shared key.
    pub fn add_dynamic_field<F, V>(&self, key: impl Into<String>, generator: F) -> &Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        let generator: FieldGenerator = Arc::new(move || generator().into());
        self.dynamic_fields.write().insert(key.into(), generator);
        self
    }

    /// Replaces the formatter.
    pub fn set_formatter(&self, formatter: impl Formatter) -> &Self {
        *self.formatter.write() = Arc::new(formatter);
        self
    }

    /// Replaces the active levels.
    pub fn set_levels(&self, levels: impl Into<Vec<Level>>) -> &Self {
        *self.levels.write() = levels.into();
        self
    }

    /// The subject events are published to.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The bound connection.
    #[must_use]
    pub const fn connection(&self) -> &C {
        &self.connection
    }

    fn apply_fields(&self, event: &mut LogEvent) {
        for (key, value) in self.extra_fields.read().iter() {
            event.fields.insert(key.clone(), value.clone());
        }

        // Generators run without the lock held so they may reconfigure the hook.
        let generators = self
            .dynamic_fields
            .read()
            .iter()
            .map(|(key, generator)| (key.clone(), generator.clone()))
            .collect::<Vec<_>>();

        for (key, generator) in generators {
            event.fields.insert(key, generator());
        }
    }
}

impl<C> Hook for NatsHook<C>
where
    C: Connection,
{
    fn fire(&self, event: &mut LogEvent) -> Result<()> {
        if self.connection.is_closed() {
            return Err(Error::ClosedConnection);
        }

        self.apply_fields(event);

        let formatter = self.formatter.read().clone();
        let payload = formatter.format(event)?;

        self.connection
            .publish(&self.subject, Bytes::from(payload))
            .map_err(|e| Error::Publish(Box::new(e)))
    }

    fn levels(&self) -> Vec<Level> {
        self.levels.read().clone()
    }
}

impl<C> Debug for NatsHook<C>
where
    C: Connection,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsHook")
            .field("connection", &self.connection)
            .field("subject", &self.subject)
            .field("extra_fields", &*self.extra_fields.read())
            .field(
                "dynamic_fields",
                &self.dynamic_fields.read().keys().collect::<Vec<_>>(),
            )
            .field("levels", &*self.levels.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::FormatError;
    use crate::test_support::MemoryConnection;

    use std::sync::atomic::{AtomicU64, Ordering};

    fn decode(payload: &[u8]) -> Map<String, Value> {
        serde_json::from_slice(payload).unwrap()
    }

    struct FailingFormatter;

    impl Formatter for FailingFormatter {
        fn format(&self, _event: &LogEvent) -> std::result::Result<Vec<u8>, FormatError> {
            Err(FormatError::Other("refusing to format".to_string()))
        }
    }

    #[test]
    fn test_simple_send() {
        let connection = MemoryConnection::new();
        let hook = NatsHook::new(connection.clone(), "test");

        hook.add_field("hook-level", "pikachu")
            .add_dynamic_field("dynamic-level", || 12);

        let mut event =
            LogEvent::new(Level::Info, "this is a test").with_field("instance-level", "charizard");
        hook.fire(&mut event).unwrap();

        let published = connection.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject, "test");

        let parsed = decode(&published[0].payload);
        assert_eq!(parsed.len(), 6);

        for fields in [&event.fields, &parsed] {
            assert_eq!(fields["hook-level"], "pikachu");
            assert_eq!(fields["instance-level"], "charizard");
            assert_eq!(fields["dynamic-level"], 12);
        }

        assert_eq!(parsed["msg"], "this is a test");
        assert_eq!(parsed["level"], "info");
        assert!(!parsed["time"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_closed_connection_publishes_nothing() {
        let connection = MemoryConnection::new();
        let hook = NatsHook::new(connection.clone(), "test");
        hook.add_field("hook-level", "pikachu");

        connection.close();

        let mut event = LogEvent::new(Level::Error, "lost");
        let result = hook.fire(&mut event);

        assert!(matches!(result, Err(Error::ClosedConnection)));
        assert!(connection.published().is_empty());
        assert!(event.fields.is_empty());
    }

    #[test]
    fn test_dynamic_field_beats_static_field() {
        let connection = MemoryConnection::new();
        let hook = NatsHook::new(connection.clone(), "test");

        hook.add_dynamic_field("shared", || "dynamic")
            .add_field("shared", "static");

        let mut event = LogEvent::new(Level::Info, "collision").with_field("shared", "pipeline");
        hook.fire(&mut event).unwrap();

        assert_eq!(event.fields["shared"], "dynamic");
        assert_eq!(decode(&connection.published()[0].payload)["shared"], "dynamic");
    }

    #[test]
    fn test_static_field_beats_pipeline_field() {
        let connection = MemoryConnection::new();
        let hook = NatsHook::new(connection.clone(), "test");
        hook.add_field("service", "hook");

        let mut event = LogEvent::new(Level::Info, "collision").with_field("service", "pipeline");
        hook.fire(&mut event).unwrap();

        assert_eq!(event.fields["service"], "hook");
    }

    #[test]
    fn test_default_levels() {
        let hook = NatsHook::new(MemoryConnection::new(), "test");

        assert_eq!(
            hook.levels(),
            vec![
                Level::Panic,
                Level::Fatal,
                Level::Error,
                Level::Warn,
                Level::Info,
                Level::Debug,
            ]
        );
    }

    #[test]
    fn test_set_levels_is_visible_immediately() {
        let hook = NatsHook::new(MemoryConnection::new(), "test");

        hook.set_levels([Level::Error, Level::Fatal]);

        assert_eq!(hook.levels(), vec![Level::Error, Level::Fatal]);
    }

    #[test]
    fn test_generator_runs_on_every_fire() {
        let connection = MemoryConnection::new();
        let hook = NatsHook::new(connection.clone(), "test");

        let counter = Arc::new(AtomicU64::new(0));
        let generator_counter = counter.clone();
        hook.add_field("hook-level", "pikachu")
            .add_dynamic_field("sequence", move || {
                generator_counter.fetch_add(1, Ordering::SeqCst) + 1
            });

        let mut event = LogEvent::new(Level::Info, "twice");
        hook.fire(&mut event).unwrap();
        hook.fire(&mut event).unwrap();

        let published = connection.published();
        assert_eq!(published.len(), 2);

        let first = decode(&published[0].payload);
        let second = decode(&published[1].payload);

        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            second.keys().collect::<Vec<_>>()
        );
        assert_eq!(first["sequence"], 1);
        assert_eq!(second["sequence"], 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_serialization_failure_publishes_nothing() {
        let connection = MemoryConnection::new();
        let hook = NatsHook::new(connection.clone(), "test");
        hook.set_formatter(FailingFormatter);

        let result = hook.fire(&mut LogEvent::new(Level::Warn, "unformattable"));

        assert!(matches!(result, Err(Error::Serialization(_))));
        assert!(connection.published().is_empty());
    }

    #[test]
    fn test_publish_failure_is_reported() {
        let connection = MemoryConnection::new();
        let hook = NatsHook::new(connection.clone(), "test");

        connection.reject_publishes(true);

        let result = hook.fire(&mut LogEvent::new(Level::Info, "rejected"));

        assert!(matches!(result, Err(Error::Publish(_))));
        assert!(connection.published().is_empty());
    }

    #[test]
    fn test_empty_subject_is_allowed_on_direct_construction() {
        let connection = MemoryConnection::new();
        let hook = NatsHook::new(connection.clone(), "");

        hook.fire(&mut LogEvent::new(Level::Info, "anywhere")).unwrap();

        assert_eq!(connection.published()[0].subject, "");
    }

    #[test]
    fn test_generator_may_reconfigure_hook() {
        let connection = MemoryConnection::new();
        let hook = Arc::new(NatsHook::new(connection.clone(), "test"));

        let weak = Arc::downgrade(&hook);
        hook.add_dynamic_field("reentrant", move || {
            if let Some(hook) = weak.upgrade() {
                hook.add_field("added-during-fire", true);
            }
            "ok"
        });

        hook.fire(&mut LogEvent::new(Level::Info, "first")).unwrap();
        hook.fire(&mut LogEvent::new(Level::Info, "second")).unwrap();

        assert_eq!(
            decode(&connection.published()[1].payload)["added-during-fire"],
            true
        );
    }
}
