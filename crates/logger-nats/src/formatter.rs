use crate::LogEvent;

use std::collections::HashMap;
use std::fmt::Write;

use chrono::SecondsFormat;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised by a [`Formatter`].
#[derive(Debug, Error)]
pub enum FormatError {
    /// JSON encoding failed.
    #[error("failed to marshal fields to JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Formatter specific failure.
    #[error("{0}")]
    Other(String),
}

/// Serializes a log event into the bytes published on the wire.
pub trait Formatter: Send + Sync + 'static {
    /// Format an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be represented.
    fn format(&self, event: &LogEvent) -> Result<Vec<u8>, FormatError>;
}

/// The standard keys a [`JsonFormatter`] writes alongside event fields.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FieldKey {
    /// The message, `msg` by default.
    Msg,
    /// The level, `level` by default.
    Level,
    /// The timestamp, `time` by default.
    Time,
}

impl FieldKey {
    const fn default_name(self) -> &'static str {
        match self {
            Self::Msg => "msg",
            Self::Level => "level",
            Self::Time => "time",
        }
    }
}

/// Writes events as a single flat JSON object terminated by a newline.
///
/// Event fields whose names collide with a standard key are kept under
/// `fields.<name>` rather than being overwritten.
#[derive(Clone, Debug, Default)]
pub struct JsonFormatter {
    /// `strftime` format for the timestamp. RFC 3339 when unset.
    pub timestamp_format: Option<String>,

    /// Leave the timestamp out entirely.
    pub disable_timestamp: bool,

    /// Renames for the standard keys.
    pub field_map: HashMap<FieldKey, String>,

    /// Indent the output.
    pub pretty_print: bool,
}

impl JsonFormatter {
    /// Creates a formatter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Renames one of the standard keys.
    #[must_use]
    pub fn with_field_name(mut self, key: FieldKey, name: impl Into<String>) -> Self {
        self.field_map.insert(key, name.into());
        self
    }

    fn key(&self, key: FieldKey) -> &str {
        self.field_map
            .get(&key)
            .map_or_else(|| key.default_name(), String::as_str)
    }

    fn prefix_field_clashes(&self, data: &mut Map<String, Value>) {
        for key in [FieldKey::Time, FieldKey::Msg, FieldKey::Level] {
            let name = self.key(key);
            if let Some(value) = data.remove(name) {
                data.insert(format!("fields.{name}"), value);
            }
        }
    }
}

impl Formatter for JsonFormatter {
    fn format(&self, event: &LogEvent) -> Result<Vec<u8>, FormatError> {
        let mut data = event.fields.clone();
        self.prefix_field_clashes(&mut data);

        if !self.disable_timestamp {
            let time = match &self.timestamp_format {
                None => event.time.to_rfc3339_opts(SecondsFormat::Secs, true),
                Some(format) => {
                    let mut time = String::new();
                    write!(time, "{}", event.time.format(format)).map_err(|_| {
                        FormatError::Other(format!("invalid timestamp format {format:?}"))
                    })?;
                    time
                }
            };
            data.insert(self.key(FieldKey::Time).to_string(), Value::String(time));
        }
        data.insert(
            self.key(FieldKey::Msg).to_string(),
            Value::String(event.message.clone()),
        );
        data.insert(
            self.key(FieldKey::Level).to_string(),
            Value::String(event.level.to_string()),
        );

        let mut bytes = if self.pretty_print {
            serde_json::to_vec_pretty(&data)?
        } else {
            serde_json::to_vec(&data)?
        };
        bytes.push(b'\n');

        Ok(bytes)
    }
}
