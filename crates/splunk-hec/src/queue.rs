// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded hand-off queue between producers and the batch worker.
//!
//! Producers block on a full queue instead of dropping; the worker is the
//! only consumer and takes either a single message with a deadline or
//! everything already waiting, up to a cap.

use crate::message::Message;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// Why a message could not be queued. The message is handed back.
#[derive(Debug)]
pub enum PutError {
    /// The caller gave up while waiting for room.
    Cancelled(Message),
    /// The worker is gone.
    Closed(Message),
}

/// Result of a timed single-element take.
#[derive(Debug)]
pub enum Take {
    Message(Message),
    TimedOut,
    Closed,
}

pub fn handoff_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueProducer { tx }, QueueConsumer { rx })
}

#[derive(Clone, Debug)]
pub struct QueueProducer {
    tx: mpsc::Sender<Message>,
}

impl QueueProducer {
    /// Waits for room in the queue unless `cancelled` resolves first.
    pub async fn put<F>(&self, message: Message, cancelled: F) -> Result<(), PutError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancelled => Err(PutError::Cancelled(message)),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(message);
                    Ok(())
                }
                Err(_) => Err(PutError::Closed(message)),
            },
        }
    }

    /// Number of messages currently waiting.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::Receiver<Message>,
}

impl QueueConsumer {
    /// Takes a single message, waiting at most `timeout`.
    pub async fn take_timeout(&mut self, timeout: Duration) -> Take {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Take::Message(message),
            Ok(None) => Take::Closed,
            Err(_) => Take::TimedOut,
        }
    }

    /// Moves up to `max` already queued messages into `batch` without waiting.
    pub fn drain_into(&mut self, batch: &mut Vec<Message>, max: usize) -> usize {
        let mut drained = 0;
        while drained < max {
            match self.rx.try_recv() {
                Ok(message) => {
                    batch.push(message);
                    drained += 1;
                }
                Err(_) => break,
            }
        }
        drained
    }
}
