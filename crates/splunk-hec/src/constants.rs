// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching, queueing and HTTP limits for the HEC output.

use std::time::Duration;

/// Maximum number of events in a single HEC POST.
pub const MAX_BATCH_ITEMS: usize = 1000;

/// Maximum age of a batch before it is emitted.
pub const MAX_BATCH_WAIT: Duration = Duration::from_millis(2000);

/// Capacity of the hand-off queue between producers and the worker.
/// Producers block once this many messages are waiting.
pub const QUEUE_CAPACITY: usize = 1024;

/// Connect and per-request timeout of the HEC client.
pub const HTTP_TIMEOUT: Duration = Duration::from_millis(4000);

pub const DEFAULT_INDEX: &str = "main";
pub const DEFAULT_SOURCETYPE: &str = "input";
pub const DEFAULT_SOURCE: &str = "graylog";

// Host configuration keys
pub const CK_SPLUNK_URL: &str = "splunk_url";
pub const CK_SPLUNK_HEC_TOKEN: &str = "splunk_hec_token";
pub const CK_SPLUNK_HEC_VERIFY_SSL: &str = "splunk_hec_verify_ssl";
pub const CK_SPLUNK_HEC_INDEX: &str = "splunk_hec_index";
pub const CK_SPLUNK_HEC_SOURCETYPE: &str = "splunk_hec_sourcetype";
pub const CK_SPLUNK_HEC_SOURCE: &str = "splunk_hec_source";
