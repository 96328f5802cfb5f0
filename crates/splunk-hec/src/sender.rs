// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The object the host pipeline talks to.
//!
//! `HecSender` owns the hand-off queue and the lifecycle of its single
//! background worker. The worker is started lazily on the first `send`
//! (or by an explicit `initialize`), at most once per sender.

use crate::config::SenderConfig;
use crate::constants::{HTTP_TIMEOUT, QUEUE_CAPACITY};
use crate::encoder::HecEncoder;
use crate::error::HecError;
use crate::message::{Message, ReservedFields};
use crate::queue::{handoff_queue, PutError, QueueConsumer, QueueProducer};
use crate::transport::{HecClient, HecTransport};
use crate::worker::{BatchWorker, WorkerControl, WorkerState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub struct HecSender {
    config: SenderConfig,
    encoder: HecEncoder,
    producer: QueueProducer,
    // Taken by the one worker that gets started
    pending_consumer: Mutex<Option<QueueConsumer>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    control: WorkerControl,
    initialized: AtomicBool,
}

impl HecSender {
    pub fn new(config: SenderConfig, reserved: ReservedFields) -> Result<Self, HecError> {
        config.validate()?;

        info!("HEC | Splunk output has been configured with the following HEC parameters:");
        info!("HEC | URL: {}", config.url);
        info!("HEC | Token: {}", config.redacted_token());
        info!("HEC | Verify SSL: {}", config.verify_tls);
        info!("HEC | Index: {}", config.index);
        info!("HEC | Source Type: {}", config.sourcetype);
        info!("HEC | Source: {}", config.source);
        info!("HEC | Default Timeout: {} ms", HTTP_TIMEOUT.as_millis());

        let (producer, consumer) = handoff_queue(QUEUE_CAPACITY);
        let encoder = HecEncoder::new(&config, reserved);

        Ok(Self {
            config,
            encoder,
            producer,
            pending_consumer: Mutex::new(Some(consumer)),
            worker: Mutex::new(None),
            control: WorkerControl::new(),
            initialized: AtomicBool::new(false),
        })
    }

    /// Builds the HTTP client and starts the worker. Later calls are no-ops.
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self) -> Result<(), HecError> {
        #[allow(clippy::expect_used)]
        let mut pending = self.pending_consumer.lock().expect("lock poisoned");
        if pending.is_none() || self.control.is_stopping() {
            return Ok(());
        }
        let client = HecClient::new(&self.config)?;
        self.start_worker(&mut pending, Arc::new(client));
        Ok(())
    }

    /// Starts the worker on a caller supplied transport. Returns false if a
    /// worker was already started.
    pub fn initialize_with_transport(&self, transport: Arc<dyn HecTransport>) -> bool {
        #[allow(clippy::expect_used)]
        let mut pending = self.pending_consumer.lock().expect("lock poisoned");
        self.start_worker(&mut pending, transport)
    }

    fn start_worker(
        &self,
        pending: &mut Option<QueueConsumer>,
        transport: Arc<dyn HecTransport>,
    ) -> bool {
        if self.control.is_stopping() {
            debug!("HEC | Sender already stopped, not starting a worker");
            return false;
        }
        let Some(consumer) = pending.take() else {
            return false;
        };

        let worker = BatchWorker::new(
            consumer,
            transport,
            self.encoder.clone(),
            self.control.clone(),
        );
        debug!("HEC | Starting worker {}", worker.name());
        let handle = tokio::spawn(worker.run());

        #[allow(clippy::expect_used)]
        let mut slot = self.worker.lock().expect("lock poisoned");
        *slot = Some(handle);
        self.initialized.store(true, Ordering::Release);
        true
    }

    /// Queues a message, starting the worker first if needed. Blocks while the
    /// queue is full; a stop releases the wait and the message is lost.
    pub async fn send(&self, message: Message) -> Result<(), HecError> {
        let stop = self.control.cancel_token();
        self.enqueue(message, stop.cancelled()).await
    }

    /// Like [`HecSender::send`], but `cancel` also releases a blocked put.
    pub async fn send_with_cancel(
        &self,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<(), HecError> {
        let stop = self.control.cancel_token();
        let cancelled = async {
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = cancel.cancelled() => {}
            }
        };
        self.enqueue(message, cancelled).await
    }

    async fn enqueue<F>(&self, message: Message, cancelled: F) -> Result<(), HecError>
    where
        F: std::future::Future<Output = ()>,
    {
        if !self.is_initialized() {
            self.initialize()?;
        }

        trace!("HEC | Sending message: {:?}", message);
        match self.producer.put(message, cancelled).await {
            Ok(()) => {}
            Err(PutError::Cancelled(lost)) => {
                warn!(
                    "HEC | Interrupted. Message was most probably lost. (source: {}, timestamp: {})",
                    lost.source, lost.timestamp
                );
            }
            Err(PutError::Closed(lost)) => {
                warn!(
                    "HEC | Sender worker is gone. Message was lost. (source: {}, timestamp: {})",
                    lost.source, lost.timestamp
                );
            }
        }
        Ok(())
    }

    /// Signals the worker to stop and returns immediately. Messages the worker
    /// holds are discarded. Calling it again is a no-op.
    pub fn stop(&self) {
        if !self.control.stop() {
            debug!("HEC | Stop already requested");
            return;
        }
        debug!("HEC | Stop requested");
        self.exit_if_never_started();
    }

    fn exit_if_never_started(&self) {
        #[allow(clippy::expect_used)]
        let pending = self.pending_consumer.lock().expect("lock poisoned");
        if pending.is_some() {
            // No worker was ever started and none will be
            self.control.set_state(WorkerState::Exited);
        }
    }

    /// Stops the worker after it has sent its current batch and whatever is
    /// still queued, waiting at most `timeout`. Returns whether the worker exited.
    pub async fn stop_graceful(&self, timeout: Duration) -> bool {
        if self.control.stop_and_flush() {
            self.exit_if_never_started();
        }

        #[allow(clippy::expect_used)]
        let handle = self.worker.lock().expect("lock poisoned").take();
        let Some(handle) = handle else {
            return self.control.state() != WorkerState::Running;
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("HEC | Sender worker failed: {e}");
                true
            }
            Err(_) => {
                warn!(
                    "HEC | Sender worker did not exit within {} ms",
                    timeout.as_millis()
                );
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn worker_state(&self) -> WorkerState {
        self.control.state()
    }

    /// Messages waiting in the hand-off queue.
    pub fn queued(&self) -> usize {
        self.producer.len()
    }
}
