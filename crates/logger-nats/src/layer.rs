//! Tracing layer that feeds events to a [`Hook`]

use crate::error::Error;
use crate::hook::Hook;
use crate::{Level, LogEvent};

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Targets never handed to the hook. Publishing goes through these crates, so
/// forwarding their events would feed the hook its own output.
const IGNORED_TARGETS: &[&str] = &["async_nats", "proven_logger_nats", "proven_nats_tls"];

/// Field `tracing-panic` attaches to the event it emits from a panic hook.
const PANIC_FIELD: &str = "panic.payload";

/// Boolean field marking an event as fatal.
const FATAL_FIELD: &str = "fatal";

/// Receives errors returned by [`Hook::fire`].
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// A tracing layer that hands every qualifying event to a hook.
///
/// The hook runs synchronously on the thread that emitted the event. Errors
/// go to the error handler (stderr by default) and never interrupt the rest
/// of the subscriber.
pub struct HookLayer<H> {
    hook: H,
    on_error: ErrorHandler,
}

impl<H> HookLayer<H>
where
    H: Hook,
{
    /// Create a new hook layer
    pub fn new(hook: H) -> Self {
        Self {
            hook,
            on_error: Arc::new(report_to_stderr),
        }
    }

    /// Replace the handler receiving fire errors
    #[must_use]
    pub fn with_error_handler<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(on_error);
        self
    }

    /// The wrapped hook
    pub const fn hook(&self) -> &H {
        &self.hook
    }
}

impl<H> Debug for HookLayer<H>
where
    H: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookLayer")
            .field("hook", &self.hook)
            .finish_non_exhaustive()
    }
}

fn report_to_stderr(error: &Error) {
    eprintln!("Failed to fire hook: {error}");
}

impl<S, H> Layer<S> for HookLayer<H>
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
    H: Hook,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        if IGNORED_TARGETS
            .iter()
            .any(|target| metadata.target().starts_with(target))
        {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let level = visitor.level.unwrap_or_else(|| (*metadata.level()).into());

        // Re-queried per event so level changes apply immediately.
        if !self.hook.levels().contains(&level) {
            return;
        }

        let mut log_event = LogEvent::new(level, visitor.message.unwrap_or_default());
        log_event.fields = visitor.fields;

        if let Err(error) = self.hook.fire(&mut log_event) {
            (self.on_error)(&error);
        }
    }
}

/// Collects the message and fields of an event
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    level: Option<Level>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = Some(match value {
                    Value::String(message) => message,
                    other => other.to_string(),
                });
                return;
            }
            PANIC_FIELD => self.level = Some(Level::Panic),
            FATAL_FIELD if value == Value::Bool(true) => {
                if self.level.is_none() {
                    self.level = Some(Level::Fatal);
                }
            }
            _ => {}
        }

        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.insert(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        let value = i64::try_from(value).map_or_else(|_| value.to_string().into(), Value::from);
        self.insert(field, value);
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        let value = u64::try_from(value).map_or_else(|_| value.to_string().into(), Value::from);
        self.insert(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string().into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.insert(field, format!("{value:?}").into());
    }
}
