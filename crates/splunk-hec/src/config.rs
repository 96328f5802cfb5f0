// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    CK_SPLUNK_HEC_INDEX, CK_SPLUNK_HEC_SOURCE, CK_SPLUNK_HEC_SOURCETYPE, CK_SPLUNK_HEC_TOKEN,
    CK_SPLUNK_HEC_VERIFY_SSL, CK_SPLUNK_URL, DEFAULT_INDEX, DEFAULT_SOURCE, DEFAULT_SOURCETYPE,
};
use crate::error::HecError;
use reqwest::Url;
use std::collections::HashMap;
use std::env;

/// A single value of the host's configuration object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    String(String),
    Bool(bool),
}

/// Key/value configuration as supplied by the host pipeline.
#[derive(Debug, Clone, Default)]
pub struct HostConfiguration {
    values: HashMap<String, ConfigValue>,
}

impl HostConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values
            .insert(key.into(), ConfigValue::String(value.into()));
        self
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.values.insert(key.into(), ConfigValue::Bool(value));
        self
    }

    /// True when the key holds a string that is not blank.
    pub fn string_is_set(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(ConfigValue::String(s)) if !s.trim().is_empty())
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(ConfigValue::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => default.to_string(),
        }
    }

    /// Booleans may arrive as real bools or as their string form.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(ConfigValue::Bool(b)) => *b,
            Some(ConfigValue::String(s)) => parse_bool(s).unwrap_or(default),
            None => default,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Validated HEC sender configuration. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct SenderConfig {
    pub url: Url,
    pub token: String,
    pub verify_tls: bool,
    pub index: String,
    pub sourcetype: String,
    pub source: String,
}

impl SenderConfig {
    /// Builds a configuration with default labels and TLS verification on.
    pub fn new(url: &str, token: &str) -> Result<Self, HecError> {
        let url = Url::parse(url.trim())
            .map_err(|e| HecError::ConfigInvalid(format!("Malformed HEC URL '{url}': {e}")))?;
        let config = Self {
            url,
            token: token.trim().to_string(),
            verify_tls: true,
            index: DEFAULT_INDEX.to_string(),
            sourcetype: DEFAULT_SOURCETYPE.to_string(),
            source: DEFAULT_SOURCE.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Materializes the configuration handed over by the host.
    pub fn from_host(host: &HostConfiguration) -> Result<Self, HecError> {
        if !host.string_is_set(CK_SPLUNK_URL) || !host.string_is_set(CK_SPLUNK_HEC_TOKEN) {
            return Err(HecError::ConfigInvalid(
                "Missing, or incomplete, configuration.".to_string(),
            ));
        }

        let mut config = Self::new(
            &host.get_string(CK_SPLUNK_URL, ""),
            &host.get_string(CK_SPLUNK_HEC_TOKEN, ""),
        )?;
        config.verify_tls = host.get_bool(CK_SPLUNK_HEC_VERIFY_SSL, true);
        config.index = host.get_string(CK_SPLUNK_HEC_INDEX, DEFAULT_INDEX);
        config.sourcetype = host.get_string(CK_SPLUNK_HEC_SOURCETYPE, DEFAULT_SOURCETYPE);
        config.source = host.get_string(CK_SPLUNK_HEC_SOURCE, DEFAULT_SOURCE);
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, HecError> {
        let mut host = HostConfiguration::new();
        for (key, var) in [
            (CK_SPLUNK_URL, "SPLUNK_URL"),
            (CK_SPLUNK_HEC_TOKEN, "SPLUNK_HEC_TOKEN"),
            (CK_SPLUNK_HEC_INDEX, "SPLUNK_HEC_INDEX"),
            (CK_SPLUNK_HEC_SOURCETYPE, "SPLUNK_HEC_SOURCETYPE"),
            (CK_SPLUNK_HEC_SOURCE, "SPLUNK_HEC_SOURCE"),
        ] {
            if let Ok(value) = env::var(var) {
                host.set_string(key, value);
            }
        }
        let verify_ssl = env::var("SPLUNK_HEC_VERIFY_SSL")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(true);
        host.set_bool(CK_SPLUNK_HEC_VERIFY_SSL, verify_ssl);

        Self::from_host(&host)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), HecError> {
        if !matches!(self.url.scheme(), "http" | "https") {
            return Err(HecError::ConfigInvalid(format!(
                "Unsupported URL scheme '{}'. Must be http or https",
                self.url.scheme()
            )));
        }

        if self.url.host_str().map_or(true, str::is_empty) {
            return Err(HecError::ConfigInvalid(
                "HEC URL must contain a host".to_string(),
            ));
        }

        if self.token.trim().is_empty() {
            return Err(HecError::ConfigInvalid(
                "HEC token cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("index", &self.index),
            ("sourcetype", &self.sourcetype),
            ("source", &self.source),
        ] {
            if value.trim().is_empty() {
                return Err(HecError::ConfigInvalid(format!("{name} cannot be empty")));
            }
        }

        Ok(())
    }

    /// Token safe for logs: first four characters only.
    pub fn redacted_token(&self) -> String {
        let prefix: String = self.token.chars().take(4).collect();
        format!("{prefix}***")
    }
}

impl std::fmt::Debug for SenderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderConfig")
            .field("url", &self.url.as_str())
            .field("token", &self.redacted_token())
            .field("verify_tls", &self.verify_tls)
            .field("index", &self.index)
            .field("sourcetype", &self.sourcetype)
            .field("source", &self.source)
            .finish()
    }
}
