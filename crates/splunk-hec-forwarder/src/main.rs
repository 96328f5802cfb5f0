// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::Duration,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use splunk_hec::{
    config::SenderConfig,
    error::HecError,
    message::{Message, ReservedFields},
    output::{MessageOutput, SplunkHecOutput},
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STREAMS_FIELD: &str = "streams";
const DEFAULT_RESERVED_FIELDS: &[&str] = &[
    "_id",
    "message",
    "source",
    "timestamp",
    "full_message",
    "gl2_message_id",
    "gl2_source_node",
    "gl2_source_input",
    "gl2_source_collector",
    "gl2_source_collector_input",
    "gl2_remote_ip",
    "gl2_remote_port",
    "gl2_remote_hostname",
];

#[tokio::main]
pub async fn main() {
    let log_level = env::var("SPLUNK_HEC_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match SenderConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error loading config: {e}. Set SPLUNK_URL and SPLUNK_HEC_TOKEN.");
            return;
        }
    };

    let output = match SplunkHecOutput::with_config(config, reserved_fields_from_env()) {
        Ok(output) => output,
        Err(e) => {
            error!("Unable to create Splunk HEC output: {e}");
            return;
        }
    };

    info!("Forwarding newline-delimited JSON messages from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut forwarded: u64 = 0;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut shutdown => {
                info!("Interrupt received, shutting down");
                break;
            }
        };

        match line {
            Ok(Some(line)) => match forward_line(&output, &line).await {
                Ok(true) => forwarded += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("Unable to forward message: {e}");
                    break;
                }
            },
            Ok(None) => {
                debug!("Reached end of input");
                break;
            }
            Err(e) => {
                error!("Failed to read from stdin: {e}");
                break;
            }
        }
    }

    if !output.stop_graceful(SHUTDOWN_TIMEOUT).await {
        warn!("Shut down before all messages could be sent");
    }
    info!("Forwarded {forwarded} message(s)");
}

/// Hands one input line to the output. Returns whether a message was forwarded.
async fn forward_line<O: MessageOutput>(output: &O, line: &str) -> Result<bool, HecError> {
    if line.trim().is_empty() {
        return Ok(false);
    }
    let message = match serde_json::from_str::<Message>(line) {
        Ok(message) => message,
        Err(e) => {
            warn!("Skipping malformed message: {e}");
            return Ok(false);
        }
    };
    if !SplunkHecOutput::accepts(&message) {
        debug!("Skipping message without fields");
        return Ok(false);
    }
    output.write(message).await?;
    Ok(true)
}

fn reserved_fields_from_env() -> ReservedFields {
    let streams_field = env::var("SPLUNK_HEC_STREAMS_FIELD")
        .ok()
        .filter(|val| !val.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STREAMS_FIELD.to_string());

    match env::var("SPLUNK_HEC_RESERVED_FIELDS") {
        Ok(list) => ReservedFields::new(
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<String>>(),
            streams_field,
        ),
        Err(_) => ReservedFields::new(DEFAULT_RESERVED_FIELDS.iter().copied(), streams_field),
    }
}
