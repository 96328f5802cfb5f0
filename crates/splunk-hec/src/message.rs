// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Messages handed over by the host pipeline.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A structured log message as received from the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    /// UTC instant of the message, millisecond precision is kept on the wire
    pub timestamp: DateTime<Utc>,
    /// Originating host of the message
    pub source: String,
    /// Primary text payload
    pub message: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl Message {
    pub fn new(
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            source: source.into(),
            message: message.into(),
            fields: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// JSON has no NaN or infinities, those are stored as their string form.
    pub fn add_float_field(&mut self, key: impl Into<String>, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.fields.insert(key.into(), value);
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Field names the host represents elsewhere and which must not be
/// forwarded inside the HEC `fields` object.
#[derive(Debug, Clone, Default)]
pub struct ReservedFields {
    names: HashSet<String>,
    streams_field: String,
}

impl ReservedFields {
    pub fn new<I, S>(names: I, streams_field: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            streams_field: streams_field.into(),
        }
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        key == self.streams_field || self.names.contains(key)
    }

    pub fn streams_field(&self) -> &str {
        &self.streams_field
    }
}
