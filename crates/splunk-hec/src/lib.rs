// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splunk HTTP Event Collector output stage.
//!
//! Messages handed over by the host pipeline are queued, coalesced into batches
//! by a single background worker and POSTed to a HEC endpoint:
//!
//! ```text
//!   host ──send──> hand-off queue ──> batch worker ──> encoder ──> HTTP POST ──> HEC
//! ```
//!
//! - **[`output`]**: host-facing adapter (`write`, `stop`, `is_running`)
//! - **[`sender`]**: owns the queue and the worker lifecycle
//! - **[`worker`]**: size/time bounded batching loop
//! - **[`encoder`]**: message to HEC event JSON
//! - **[`transport`]**: reqwest client with token header and fixed timeouts
//! - **[`config`]**: validated sender configuration

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod message;
pub mod output;
pub mod queue;
pub mod sender;
pub mod transport;
pub mod worker;
