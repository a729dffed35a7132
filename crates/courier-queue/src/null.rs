use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::{QueueConfig, QueueKind};
use crate::error::{QueueError, Result};
use crate::Queue;

/// A queue that rejects every item and is always empty.
pub struct NullQueue<T> {
    name: String,
    temporary: bool,
    durable: bool,
    removed: AtomicBool,
    _items: PhantomData<fn(T)>,
}

impl<T> NullQueue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(&QueueConfig::new(name, QueueKind::Null, 0))
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        Self {
            name: config.name.clone(),
            temporary: config.temporary,
            durable: config.durable,
            removed: AtomicBool::new(false),
            _items: PhantomData,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.removed.load(Ordering::Acquire) {
            return Err(QueueError::Removed(self.name.clone()));
        }
        Ok(())
    }
}

impl<T> Queue<T> for NullQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> QueueKind {
        QueueKind::Null
    }

    fn capacity(&self) -> usize {
        0
    }

    fn is_temporary(&self) -> bool {
        self.temporary
    }

    fn is_durable(&self) -> bool {
        self.durable
    }

    fn len(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(0)
    }

    fn offer_timeout(&self, _item: T, _timeout: Duration) -> Result<bool> {
        self.ensure_live()?;
        Ok(false)
    }

    fn poll_timeout(&self, _timeout: Duration) -> Result<Option<T>> {
        self.ensure_live()?;
        Ok(None)
    }

    fn clear(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(0)
    }

    fn on_remove(&self) -> Result<()> {
        if self.removed.swap(true, Ordering::AcqRel) {
            return Err(QueueError::Removed(self.name.clone()));
        }
        Ok(())
    }
}
