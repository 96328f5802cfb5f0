// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport to the HEC endpoint.

use crate::config::SenderConfig;
use crate::constants::HTTP_TIMEOUT;
use crate::error::{HecError, HttpFailure};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use splunk_fips::reqwest_adapter::{create_reqwest_client_builder, TlsVerification};
use tracing::debug;

const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

#[async_trait]
pub trait HecTransport: Send + Sync {
    /// POSTs a newline separated batch of events. Anything but a `200` is a failure.
    async fn post(&self, body: String) -> Result<(), HttpFailure>;
}

/// reqwest based HEC client with token authentication.
#[derive(Debug, Clone)]
pub struct HecClient {
    client: reqwest::Client,
    url: Url,
    headers: HeaderMap,
}

impl HecClient {
    pub fn new(config: &SenderConfig) -> Result<Self, HecError> {
        let client = build_client(config.verify_tls)?;

        let mut authorization = HeaderValue::from_str(&format!("Splunk {}", config.token))
            .map_err(|_| {
                HecError::ConfigInvalid("HEC token contains invalid header characters".to_string())
            })?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));

        Ok(Self {
            client,
            url: config.url.clone(),
            headers,
        })
    }
}

#[async_trait]
impl HecTransport for HecClient {
    async fn post(&self, body: String) -> Result<(), HttpFailure> {
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        // Read the body to the end so the connection is released on every path
        if let Err(e) = response.bytes().await {
            debug!("HEC | Failed to drain response body: {e}");
        }

        if status != StatusCode::OK {
            return Err(HttpFailure::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Connect and request deadlines are both `HTTP_TIMEOUT`. No idle connections are
/// pooled, so a request never lands on a stale socket that would need a retry.
fn build_client(verify_tls: bool) -> Result<reqwest::Client, HecError> {
    create_reqwest_client_builder(TlsVerification::from_verify_flag(verify_tls))
        .map_err(|e| HecError::Client(e.to_string()))?
        .connect_timeout(HTTP_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .pool_max_idle_per_host(0)
        .build()
        .map_err(|e| HecError::Client(e.to_string()))
}
