use crate::Level;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A log event as handed to a hook.
///
/// Hooks mutate `fields` in place.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEvent {
    /// The log message
    pub message: String,
    /// Severity
    pub level: Level,
    /// When the event was emitted
    pub time: DateTime<Utc>,
    /// Structured fields attached to the event
    pub fields: Map<String, Value>,
}

impl LogEvent {
    /// Creates an event stamped with the current time and no fields.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            time: Utc::now(),
            fields: Map::new(),
        }
    }

    /// Builder-style method for adding a field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Builder-style method for setting the timestamp
    #[must_use]
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }
}
