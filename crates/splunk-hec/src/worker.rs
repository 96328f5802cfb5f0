// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background worker that turns queued messages into HEC batches.
//!
//! ```text
//!   Idle ──msg──> Accumulating ──size ≥ max or age ≥ max──> Emit ──ok | failure──> Idle
//! ```
//!
//! A batch is emitted once it holds `MAX_BATCH_ITEMS` messages or is
//! `MAX_BATCH_WAIT` old, whichever happens first. Failed POSTs are logged and
//! the batch is dropped; there is no retry. On a plain stop the local batch is
//! discarded, on a flushing stop it is sent together with whatever is still queued.

use crate::constants::{MAX_BATCH_ITEMS, MAX_BATCH_WAIT};
use crate::encoder::HecEncoder;
use crate::message::Message;
use crate::queue::{QueueConsumer, Take};
use crate::transport::HecTransport;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    New = 0,
    Running = 1,
    Stopping = 2,
    Exited = 3,
}

impl From<u8> for WorkerState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::New,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Exited,
        }
    }
}

/// Stop signal and lifecycle state shared between the sender and its worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerControl {
    cancel: CancellationToken,
    flush_on_stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

impl WorkerControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the worker to exit after its current iteration. Returns false if
    /// a stop was already requested.
    pub fn stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let _ = self.state.compare_exchange(
            WorkerState::Running as u8,
            WorkerState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.cancel.cancel();
        true
    }

    /// Like [`WorkerControl::stop`], but the worker sends what it holds before exiting.
    pub fn stop_and_flush(&self) -> bool {
        self.flush_on_stop.store(true, Ordering::Release);
        self.stop()
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from(self.state.load(Ordering::Acquire))
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn flush_on_stop(&self) -> bool {
        self.flush_on_stop.load(Ordering::Acquire)
    }
}

/// Messages accumulated for the next POST.
#[derive(Debug)]
struct Batch {
    messages: Vec<Message>,
    started: Instant,
}

impl Batch {
    fn new() -> Self {
        Self {
            messages: Vec::with_capacity(MAX_BATCH_ITEMS),
            started: Instant::now(),
        }
    }

    fn room(&self) -> usize {
        MAX_BATCH_ITEMS.saturating_sub(self.messages.len())
    }

    fn is_due(&self, now: Instant) -> bool {
        self.messages.len() >= MAX_BATCH_ITEMS
            || now.saturating_duration_since(self.started) >= MAX_BATCH_WAIT
    }

    fn reset(&mut self) {
        self.messages.clear();
        self.started = Instant::now();
    }
}

pub struct BatchWorker {
    name: String,
    consumer: QueueConsumer,
    transport: Arc<dyn HecTransport>,
    encoder: HecEncoder,
    control: WorkerControl,
    batch: Batch,
}

impl BatchWorker {
    pub fn new(
        consumer: QueueConsumer,
        transport: Arc<dyn HecTransport>,
        encoder: HecEncoder,
        control: WorkerControl,
    ) -> Self {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            name: format!("hec-sender-{id}"),
            consumer,
            transport,
            encoder,
            control,
            batch: Batch::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(mut self) {
        debug!("HEC | {}: started", self.name);
        // A stop may already have been requested before the worker got scheduled
        let _ = self.control.state.compare_exchange(
            WorkerState::New as u8,
            WorkerState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let cancel = self.control.cancel_token().clone();
        let mut queue_closed = false;

        while !self.control.is_stopping() {
            let elapsed = Instant::now().saturating_duration_since(self.batch.started);
            let poll_timeout = MAX_BATCH_WAIT.saturating_sub(elapsed);

            if !poll_timeout.is_zero() {
                let take = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    take = self.consumer.take_timeout(poll_timeout) => Some(take),
                };
                match take {
                    Some(Take::Message(message)) => {
                        self.batch.messages.push(message);
                        let room = self.batch.room();
                        if room > 0 {
                            self.consumer.drain_into(&mut self.batch.messages, room);
                        }
                    }
                    Some(Take::TimedOut) => {}
                    Some(Take::Closed) => {
                        queue_closed = true;
                    }
                    None => {
                        debug!("HEC | {}: stop requested while waiting for messages", self.name);
                    }
                }
            }

            if queue_closed {
                // Every producer is gone, nothing else will ever arrive
                debug!("HEC | {}: queue closed", self.name);
                break;
            }

            self.emit_if_due().await;
        }

        if queue_closed || self.control.flush_on_stop() {
            self.flush_remaining().await;
        } else if !self.batch.messages.is_empty() {
            warn!(
                "HEC | {}: Stopping with {} unsent message(s), they are discarded",
                self.name,
                self.batch.messages.len()
            );
        }
        self.batch.messages.clear();
        self.control.set_state(WorkerState::Exited);
        debug!("HEC | {}: exiting!", self.name);
    }

    async fn emit_if_due(&mut self) {
        let now = Instant::now();
        if !self.batch.is_due(now) {
            return;
        }
        if self.batch.messages.is_empty() {
            self.batch.started = now;
            return;
        }
        self.emit().await;
    }

    /// POSTs the current batch once and clears it whatever the outcome.
    async fn emit(&mut self) {
        let count = self.batch.messages.len();
        let body = self.encoder.encode_batch(&self.batch.messages);
        info!(
            "HEC | {}: Sending {} message(s), with a payload size of {} bytes, to splunk",
            self.name,
            count,
            body.len()
        );

        match self.transport.post(body).await {
            Ok(()) => debug!("HEC | {}: Successfully sent {} message(s)", self.name, count),
            Err(e) => error!(
                "HEC | {}: Call to Splunk HEC endpoint failed! {} log message(s) likely lost: {}",
                self.name, count, e
            ),
        }
        self.batch.reset();
    }

    async fn flush_remaining(&mut self) {
        loop {
            let room = self.batch.room();
            self.consumer.drain_into(&mut self.batch.messages, room);
            if self.batch.messages.is_empty() {
                break;
            }
            self.emit().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SenderConfig;
    use crate::error::HttpFailure;
    use crate::message::ReservedFields;
    use crate::queue::{handoff_queue, QueueProducer};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tracing_test::traced_test;

    #[derive(Clone, Default)]
    struct RecordingTransport {
        posts: Arc<Mutex<Vec<(Instant, String)>>>,
        fail_with: Option<HttpFailure>,
    }

    impl RecordingTransport {
        fn failing(failure: HttpFailure) -> Self {
            Self {
                fail_with: Some(failure),
                ..Default::default()
            }
        }

        fn posts(&self) -> Vec<(Instant, String)> {
            self.posts.lock().unwrap().clone()
        }

        fn events(&self) -> Vec<Vec<String>> {
            self.posts()
                .into_iter()
                .map(|(_, body)| {
                    body.lines()
                        .map(|line| {
                            let v: serde_json::Value = serde_json::from_str(line).unwrap();
                            v["event"].as_str().unwrap().to_string()
                        })
                        .collect()
                })
                .collect()
        }
    }

    #[async_trait]
    impl HecTransport for RecordingTransport {
        async fn post(&self, body: String) -> Result<(), HttpFailure> {
            self.posts.lock().unwrap().push((Instant::now(), body));
            match &self.fail_with {
                Some(failure) => Err(failure.clone()),
                None => Ok(()),
            }
        }
    }

    fn encoder() -> HecEncoder {
        let config = SenderConfig::new("http://localhost:8088/services/collector", "TOK").unwrap();
        HecEncoder::new(&config, ReservedFields::new(["source"], "streams"))
    }

    fn spawn_worker(
        transport: &RecordingTransport,
    ) -> (QueueProducer, WorkerControl, JoinHandle<()>) {
        let (producer, consumer) = handoff_queue(crate::constants::QUEUE_CAPACITY);
        let control = WorkerControl::new();
        let worker = BatchWorker::new(
            consumer,
            Arc::new(transport.clone()),
            encoder(),
            control.clone(),
        );
        (producer, control, tokio::spawn(worker.run()))
    }

    async fn put_all(producer: &QueueProducer, range: std::ops::Range<usize>) {
        for i in range {
            producer
                .put(
                    Message::new(Utc::now(), "h1", format!("m{i}")),
                    std::future::pending(),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_triggered_flush() {
        let transport = RecordingTransport::default();
        let (producer, control, handle) = spawn_worker(&transport);
        let start = Instant::now();

        put_all(&producer, 0..MAX_BATCH_ITEMS).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let posts = transport.posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.duration_since(start) < MAX_BATCH_WAIT);
        assert_eq!(transport.events()[0].len(), MAX_BATCH_ITEMS);

        control.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_triggered_flush() {
        let transport = RecordingTransport::default();
        let (producer, control, handle) = spawn_worker(&transport);
        let start = Instant::now();

        put_all(&producer, 0..3).await;
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(transport.posts().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let posts = transport.posts();
        assert_eq!(posts.len(), 1);
        let waited = posts[0].0.duration_since(start);
        assert!(waited >= MAX_BATCH_WAIT && waited < MAX_BATCH_WAIT + Duration::from_millis(100));
        assert_eq!(transport.events(), vec![vec!["m0", "m1", "m2"]]);

        control.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_bounded_and_ordered() {
        let transport = RecordingTransport::default();
        let (producer, control, handle) = spawn_worker(&transport);

        put_all(&producer, 0..2500).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        let batches = transport.events();
        assert!(batches.iter().all(|b| b.len() <= MAX_BATCH_ITEMS));
        let all: Vec<String> = batches.into_iter().flatten().collect();
        let expected: Vec<String> = (0..2500).map(|i| format!("m{i}")).collect();
        assert_eq!(all, expected);

        control.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_does_not_post() {
        let transport = RecordingTransport::default();
        let (_producer, control, handle) = spawn_worker(&transport);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(transport.posts().is_empty());
        assert_eq!(control.state(), WorkerState::Running);

        control.stop();
        handle.await.unwrap();
        assert_eq!(control.state(), WorkerState::Exited);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_failed_post_drops_batch_and_continues() {
        let transport = RecordingTransport::failing(HttpFailure::Status(500));
        let (producer, control, handle) = spawn_worker(&transport);

        put_all(&producer, 0..5).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(transport.posts().len(), 1);
        assert!(logs_contain("Call to Splunk HEC endpoint failed"));
        assert!(logs_contain("Unexpected HTTP response status 500"));

        put_all(&producer, 5..7).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let batches = transport.events();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1], vec!["m5", "m6"]);

        control.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_pending_batch() {
        let transport = RecordingTransport::default();
        let (producer, control, handle) = spawn_worker(&transport);

        put_all(&producer, 0..10).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(control.stop());
        assert!(!control.stop());

        handle.await.unwrap();
        assert_eq!(control.state(), WorkerState::Exited);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(transport.posts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushing_stop_sends_pending_messages() {
        let transport = RecordingTransport::default();
        let (producer, control, handle) = spawn_worker(&transport);

        put_all(&producer, 0..10).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        control.stop_and_flush();
        handle.await.unwrap();

        let batches = transport.events();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_queue_flushes_and_exits() {
        let transport = RecordingTransport::default();
        let (producer, control, handle) = spawn_worker(&transport);

        put_all(&producer, 0..4).await;
        drop(producer);
        handle.await.unwrap();

        assert_eq!(control.state(), WorkerState::Exited);
        assert_eq!(transport.events(), vec![vec!["m0", "m1", "m2", "m3"]]);
    }
}
