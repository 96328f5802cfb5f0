// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host plugin surface: the output object, its descriptor and the
//! configuration fields it requests from the host.

use crate::config::{HostConfiguration, SenderConfig};
use crate::constants::{
    CK_SPLUNK_HEC_INDEX, CK_SPLUNK_HEC_SOURCE, CK_SPLUNK_HEC_SOURCETYPE, CK_SPLUNK_HEC_TOKEN,
    CK_SPLUNK_HEC_VERIFY_SSL, CK_SPLUNK_URL, DEFAULT_INDEX, DEFAULT_SOURCE, DEFAULT_SOURCETYPE,
};
use crate::error::HecError;
use crate::message::{Message, ReservedFields};
use crate::sender::HecSender;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Contract between the host pipeline and an output.
#[async_trait]
pub trait MessageOutput: Send + Sync {
    async fn write(&self, message: Message) -> Result<(), HecError>;

    async fn write_batch(&self, messages: Vec<Message>) -> Result<(), HecError> {
        for message in messages {
            self.write(message).await?;
        }
        Ok(())
    }

    fn stop(&self);

    fn is_running(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Boolean,
}

/// A configuration field the host renders for this output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigField {
    pub key: &'static str,
    pub human_name: &'static str,
    pub default_value: &'static str,
    pub description: &'static str,
    pub optional: bool,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: &'static str,
    pub exclusive: bool,
    pub link: &'static str,
    pub description: &'static str,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            name: "Splunk HEC Output",
            exclusive: false,
            link: "",
            description: "Writes messages to your Splunk installation via HEC input.",
        }
    }
}

pub fn requested_configuration() -> Vec<ConfigField> {
    vec![
        ConfigField {
            key: CK_SPLUNK_URL,
            human_name: "Splunk HEC URL",
            default_value: "",
            description: "HEC URL",
            optional: false,
            kind: FieldKind::Text,
        },
        ConfigField {
            key: CK_SPLUNK_HEC_TOKEN,
            human_name: "Splunk HEC Token",
            default_value: "",
            description: "HEC Token",
            optional: false,
            kind: FieldKind::Text,
        },
        ConfigField {
            key: CK_SPLUNK_HEC_VERIFY_SSL,
            human_name: "Verify SSL",
            default_value: "true",
            description: "Should SSL be verified",
            optional: true,
            kind: FieldKind::Boolean,
        },
        ConfigField {
            key: CK_SPLUNK_HEC_INDEX,
            human_name: "Splunk Index",
            default_value: DEFAULT_INDEX,
            description: "Splunk index",
            optional: true,
            kind: FieldKind::Text,
        },
        ConfigField {
            key: CK_SPLUNK_HEC_SOURCETYPE,
            human_name: "Splunk Source Type",
            default_value: DEFAULT_SOURCETYPE,
            description: "Splunk sourcetype",
            optional: true,
            kind: FieldKind::Text,
        },
        ConfigField {
            key: CK_SPLUNK_HEC_SOURCE,
            human_name: "Splunk Source",
            default_value: DEFAULT_SOURCE,
            description: "Splunk source",
            optional: true,
            kind: FieldKind::Text,
        },
    ]
}

pub struct SplunkHecOutput {
    sender: HecSender,
    running: AtomicBool,
}

impl SplunkHecOutput {
    pub fn new(configuration: &HostConfiguration, reserved: ReservedFields) -> Result<Self, HecError> {
        let config = SenderConfig::from_host(configuration)?;
        Self::with_config(config, reserved)
    }

    pub fn with_config(config: SenderConfig, reserved: ReservedFields) -> Result<Self, HecError> {
        Ok(Self {
            sender: HecSender::new(config, reserved)?,
            running: AtomicBool::new(true),
        })
    }

    /// Messages without any fields are not forwarded.
    pub fn accepts(message: &Message) -> bool {
        !message.fields.is_empty()
    }

    pub fn sender(&self) -> &HecSender {
        &self.sender
    }

    /// Stops the output, giving the sender up to `timeout` to send what it holds.
    pub async fn stop_graceful(&self, timeout: Duration) -> bool {
        self.running.store(false, Ordering::Release);
        self.sender.stop_graceful(timeout).await
    }
}

#[async_trait]
impl MessageOutput for SplunkHecOutput {
    async fn write(&self, message: Message) -> Result<(), HecError> {
        if !Self::accepts(&message) {
            debug!("HEC | Skipping message without fields");
            return Ok(());
        }
        self.sender.send(message).await
    }

    fn stop(&self) {
        self.sender.stop();
        self.running.store(false, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn host_config() -> HostConfiguration {
        let mut host = HostConfiguration::new();
        host.set_string(CK_SPLUNK_URL, "http://localhost:8088/services/collector")
            .set_string(CK_SPLUNK_HEC_TOKEN, "TOK");
        host
    }

    #[test]
    fn test_requested_configuration_matches_keys() {
        let fields = requested_configuration();
        let keys: Vec<&str> = fields.iter().map(|f| f.key).collect();
        assert_eq!(
            keys,
            vec![
                "splunk_url",
                "splunk_hec_token",
                "splunk_hec_verify_ssl",
                "splunk_hec_index",
                "splunk_hec_sourcetype",
                "splunk_hec_source"
            ]
        );
        let required: Vec<&str> = fields
            .iter()
            .filter(|f| !f.optional)
            .map(|f| f.key)
            .collect();
        assert_eq!(required, vec!["splunk_url", "splunk_hec_token"]);
    }

    #[test]
    fn test_descriptor() {
        let descriptor = Descriptor::default();
        assert_eq!(descriptor.name, "Splunk HEC Output");
        assert!(!descriptor.exclusive);
    }

    #[test]
    fn test_incomplete_configuration_rejected() {
        let mut host = HostConfiguration::new();
        host.set_string(CK_SPLUNK_URL, "http://localhost:8088");
        match SplunkHecOutput::new(&host, ReservedFields::default()) {
            Err(HecError::ConfigInvalid(msg)) => {
                assert_eq!(msg, "Missing, or incomplete, configuration.")
            }
            _ => panic!("expected ConfigInvalid"),
        }
    }

    #[tokio::test]
    async fn test_message_without_fields_is_skipped() {
        let output = SplunkHecOutput::new(&host_config(), ReservedFields::default()).unwrap();
        assert!(output.is_running());

        output
            .write(Message::new(Utc::now(), "h1", "no fields"))
            .await
            .unwrap();
        assert!(!output.sender().is_initialized());

        output
            .write(Message::new(Utc::now(), "h1", "hello").with_field("user", "a"))
            .await
            .unwrap();
        assert!(output.sender().is_initialized());

        output.stop();
        assert!(!output.is_running());
    }
}
