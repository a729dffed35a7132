use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::config::{QueueConfig, QueueKind};
use crate::error::{QueueError, Result};
use crate::Queue;

struct State<T> {
    items: VecDeque<T>,
    removed: bool,
}

/// Fixed-capacity FIFO queue.
///
/// `offer_timeout` waits for room and `poll_timeout` waits for an item, each
/// up to its timeout. A zero timeout makes a single attempt.
pub struct BoundedQueue<T> {
    name: String,
    capacity: usize,
    temporary: bool,
    durable: bool,
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedQueue<T> {
    /// A durable queue holding at most `capacity` items (minimum 1).
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_config(&QueueConfig::new(name, QueueKind::Bounded, capacity))
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            name: config.name.clone(),
            capacity,
            temporary: config.temporary,
            durable: config.durable,
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                removed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State<T>>> {
        let state = self.state.lock();
        if state.removed {
            return Err(QueueError::Removed(self.name.clone()));
        }
        Ok(state)
    }

    /// Block on `condvar` until woken or `deadline` passes.
    ///
    /// Returns false when the wait is over without a wakeup.
    fn wait(
        condvar: &Condvar,
        state: &mut MutexGuard<'_, State<T>>,
        timeout: Duration,
        deadline: Option<Instant>,
    ) -> bool {
        if timeout.is_zero() {
            return false;
        }
        match deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return false;
                }
                condvar.wait_until(state, deadline);
                true
            }
            None => {
                condvar.wait(state);
                true
            }
        }
    }
}

impl<T: Send> Queue<T> for BoundedQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> QueueKind {
        QueueKind::Bounded
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn is_temporary(&self) -> bool {
        self.temporary
    }

    fn is_durable(&self) -> bool {
        self.durable
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.items.len())
    }

    fn offer_timeout(&self, item: T, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock()?;
        loop {
            if state.items.len() < self.capacity {
                state.items.push_back(item);
                drop(state);
                self.not_empty.notify_one();
                return Ok(true);
            }
            if !Self::wait(&self.not_full, &mut state, timeout, deadline) {
                return Ok(false);
            }
            if state.removed {
                return Err(QueueError::Removed(self.name.clone()));
            }
        }
    }

    fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock()?;
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(Some(item));
            }
            if !Self::wait(&self.not_empty, &mut state, timeout, deadline) {
                return Ok(None);
            }
            if state.removed {
                return Err(QueueError::Removed(self.name.clone()));
            }
        }
    }

    fn clear(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let dropped = state.items.len();
        state.items.clear();
        drop(state);
        self.not_full.notify_all();
        Ok(dropped)
    }

    fn on_remove(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.removed = true;
        let dropped = state.items.len();
        state.items.clear();
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        debug!(queue = %self.name, dropped, "bounded queue removed");
        Ok(())
    }
}
