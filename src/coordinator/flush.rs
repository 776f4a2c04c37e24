// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk queue: buffer plus flush scheduling.
//!
//! A size-threshold append flushes inline and cancels any pending timer.
//! Otherwise the first append arms a single-shot delay timer. The buffer is
//! emptied before the bulk request is awaited, so overlapping flushes never
//! send the same instruction twice.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::batching::{BulkBuffer, BulkConfig, BulkInstruction, FlushReason};
use crate::metrics;
use crate::storage::traits::SearchClient;

use super::types::IndexEvent;

struct QueueInner {
    buffer: Mutex<BulkBuffer>,
    timer: Mutex<Option<JoinHandle<()>>>,
    client: Arc<dyn SearchClient>,
    events: broadcast::Sender<IndexEvent>,
}

/// Shared handle to one model's bulk buffer.
#[derive(Clone)]
pub struct BulkQueue {
    inner: Arc<QueueInner>,
}

impl BulkQueue {
    pub fn new(config: BulkConfig, client: Arc<dyn SearchClient>, events: broadcast::Sender<IndexEvent>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                buffer: Mutex::new(BulkBuffer::new(config)),
                timer: Mutex::new(None),
                client,
                events,
            }),
        }
    }

    /// Append instructions; flushes inline when the size threshold is hit.
    pub async fn push(&self, instructions: Vec<BulkInstruction>) {
        let (reason, pending, delay) = {
            let mut buffer = self.inner.buffer.lock();
            let reason = buffer.extend(instructions);
            (reason, buffer.len(), buffer.config().delay())
        };
        metrics::set_bulk_pending(pending);

        match reason {
            Some(reason) => {
                self.cancel_timer();
                self.inner.flush(reason).await;
            }
            None => self.arm_timer(delay),
        }
    }

    /// Send everything pending now.
    pub async fn flush(&self) -> usize {
        self.cancel_timer();
        self.inner.flush(FlushReason::Manual).await
    }

    /// Cancel the timer and send what is left.
    pub async fn shutdown(&self) -> usize {
        self.cancel_timer();
        self.inner.flush(FlushReason::Shutdown).await
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    #[must_use]
    pub fn timer_armed(&self) -> bool {
        self.inner.timer.lock().is_some()
    }

    #[must_use]
    pub fn config(&self) -> BulkConfig {
        self.inner.buffer.lock().config().clone()
    }

    /// Swap settings, returning the previous ones. Pending instructions stay.
    pub fn replace_config(&self, config: BulkConfig) -> BulkConfig {
        self.inner.buffer.lock().replace_config(config)
    }

    fn cancel_timer(&self) {
        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
        }
    }

    fn arm_timer(&self, delay: std::time::Duration) {
        let mut timer = self.inner.timer.lock();
        if timer.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            // An empty slot means a size flush got here first
            if inner.timer.lock().take().is_none() {
                return;
            }
            inner.flush(FlushReason::Delay).await;
        }));
    }
}

impl QueueInner {
    async fn flush(&self, reason: FlushReason) -> usize {
        let batch = self.buffer.lock().take();
        metrics::set_bulk_pending(0);
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        metrics::record_bulk_flush(reason.as_str(), count);
        debug!(count, reason = reason.as_str(), "Flushing bulk buffer");

        match self.client.bulk(batch).await {
            Err(error) => {
                warn!(count, error = %error, "Bulk request failed");
                metrics::record_bulk_errors("request", 1);
                let _ = self.events.send(IndexEvent::BulkError { index: None, id: None, error });
            }
            Ok(response) => {
                let mut failed = 0;
                for item in response.failures() {
                    failed += 1;
                    let error = item.to_error();
                    warn!(index = %item.index, id = %item.id, error = %error, "Bulk item failed");
                    let _ = self.events.send(IndexEvent::BulkError {
                        index: Some(item.index.clone()),
                        id: Some(item.id.clone()),
                        error,
                    });
                }
                if failed > 0 {
                    metrics::record_bulk_errors("item", failed);
                }
            }
        }
        count
    }
}
