// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Message to HEC event envelope encoding.

use crate::config::SenderConfig;
use crate::message::{Message, ReservedFields};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// One event as accepted by the HEC `/services/collector` endpoint.
#[derive(Serialize, Debug)]
pub struct HecEvent<'a> {
    /// Unix epoch milliseconds
    pub time: i64,
    pub host: &'a str,
    pub source: &'a str,
    pub sourcetype: &'a str,
    pub index: &'a str,
    pub event: &'a str,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct HecEncoder {
    index: String,
    sourcetype: String,
    source: String,
    reserved: ReservedFields,
}

impl HecEncoder {
    pub fn new(config: &SenderConfig, reserved: ReservedFields) -> Self {
        Self {
            index: config.index.clone(),
            sourcetype: config.sourcetype.clone(),
            source: config.source.clone(),
            reserved,
        }
    }

    pub fn to_event<'a>(&'a self, message: &'a Message) -> HecEvent<'a> {
        let fields = message
            .fields
            .iter()
            .filter(|(key, _)| !self.reserved.is_excluded(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        HecEvent {
            time: message.timestamp_millis(),
            host: &message.source,
            source: &self.source,
            sourcetype: &self.sourcetype,
            index: &self.index,
            event: &message.message,
            fields,
        }
    }

    /// Encodes one message as a single-line JSON object, without trailing newline.
    pub fn encode(&self, message: &Message) -> String {
        let event = self.to_event(message);
        match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                // Only reachable through a broken Serialize impl, fall back to string forms
                warn!("HEC | Failed to encode message, stringifying fields: {e}");
                let fields = event
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.to_string())))
                    .collect();
                serde_json::json!({
                    "time": event.time,
                    "host": event.host,
                    "source": event.source,
                    "sourcetype": event.sourcetype,
                    "index": event.index,
                    "event": event.event,
                    "fields": Value::Object(fields),
                })
                .to_string()
            }
        }
    }

    /// Encodes a batch as newline separated events, keeping input order.
    pub fn encode_batch(&self, messages: &[Message]) -> String {
        let mut body = String::new();
        for message in messages {
            body.push_str(&self.encode(message));
            body.push('\n');
        }
        body
    }
}
