// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error as StdError;

/// Errors surfaced by the HEC output.
#[derive(Debug, thiserror::Error)]
pub enum HecError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Coarse classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Tls,
    Body,
    Other,
}

/// A POST to the HEC endpoint that did not end in a `200`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpFailure {
    #[error("Unexpected HTTP response status {0}")]
    Status(u16),

    #[error("Error while posting to HEC endpoint ({kind:?}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
}

impl HttpFailure {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Transport { .. } => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Status(_) => None,
            Self::Transport { kind, .. } => Some(*kind),
        }
    }
}

impl From<reqwest::Error> for HttpFailure {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.source().is_some_and(is_tls_cause) {
            TransportErrorKind::Tls
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };

        // reqwest's Display hides the cause, the chain carries the useful part
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        Self::Transport { kind, message }
    }
}

/// rustls surfaces handshake failures as io errors deep in the source chain.
/// Only typed causes are inspected, never their messages, which may carry the URL.
fn is_tls_cause(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(cause) = source {
        if cause.is::<rustls::Error>() {
            return true;
        }
        source = match cause.downcast_ref::<std::io::Error>() {
            // io::Error::source skips its own payload
            Some(io) => io.get_ref().map(|inner| inner as &(dyn StdError + 'static)),
            None => cause.source(),
        };
    }
    false
}
