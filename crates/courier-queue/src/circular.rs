use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::{QueueConfig, QueueKind};
use crate::error::{QueueError, Result};
use crate::Queue;

/// Fixed-capacity ring that overwrites its oldest item when full.
///
/// Never blocks and never rejects an item. Reads are lock-free; writers
/// (offer, clear, remove) take a short mutex so evictions happen in offer
/// order. Timeouts are accepted for interface parity and ignored.
pub struct CircularBuffer<T> {
    name: String,
    temporary: bool,
    durable: bool,
    items: ArrayQueue<T>,
    writer: Mutex<()>,
    removed: AtomicBool,
}

impl<T> CircularBuffer<T> {
    /// A durable ring holding the last `capacity` items (minimum 1).
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_config(&QueueConfig::new(name, QueueKind::Circular, capacity))
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        Self {
            name: config.name.clone(),
            temporary: config.temporary,
            durable: config.durable,
            items: ArrayQueue::new(config.capacity.max(1)),
            writer: Mutex::new(()),
            removed: AtomicBool::new(false),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.removed.load(Ordering::Acquire) {
            return Err(QueueError::Removed(self.name.clone()));
        }
        Ok(())
    }

    fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.items.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

impl<T: Send> Queue<T> for CircularBuffer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> QueueKind {
        QueueKind::Circular
    }

    fn capacity(&self) -> usize {
        self.items.capacity()
    }

    fn is_temporary(&self) -> bool {
        self.temporary
    }

    fn is_durable(&self) -> bool {
        self.durable
    }

    fn len(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.items.len())
    }

    fn offer_timeout(&self, item: T, _timeout: Duration) -> Result<bool> {
        self.ensure_live()?;
        let _writer = self.writer.lock();
        // on_remove may have drained the ring while this call waited.
        self.ensure_live()?;
        if self.items.force_push(item).is_some() {
            trace!(queue = %self.name, "circular buffer evicted oldest item");
        }
        Ok(true)
    }

    fn poll_timeout(&self, _timeout: Duration) -> Result<Option<T>> {
        self.ensure_live()?;
        Ok(self.items.pop())
    }

    fn clear(&self) -> Result<usize> {
        self.ensure_live()?;
        let _writer = self.writer.lock();
        self.ensure_live()?;
        Ok(self.drain())
    }

    fn on_remove(&self) -> Result<()> {
        if self.removed.swap(true, Ordering::AcqRel) {
            return Err(QueueError::Removed(self.name.clone()));
        }
        let _writer = self.writer.lock();
        let dropped = self.drain();
        debug!(queue = %self.name, dropped, "circular buffer removed");
        Ok(())
    }
}
