//! In-process queues for courier.
//!
//! Three interchangeable backends share the [`Queue`] trait:
//! - [`BoundedQueue`]: fixed-capacity FIFO whose timed operations block
//! - [`CircularBuffer`]: fixed-capacity ring that evicts the oldest item and
//!   never blocks
//! - [`NullQueue`]: rejects every item
//!
//! Durability is layered on top by decorators (see `courier-wal`), which own
//! a backend and implement the same trait.

pub mod bounded;
pub mod circular;
pub mod config;
pub mod error;
pub mod null;

use std::time::Duration;

pub use bounded::BoundedQueue;
pub use circular::CircularBuffer;
pub use config::{QueueConfig, QueueKind};
pub use error::{QueueError, Result};
pub use null::NullQueue;

/// Common interface of every queue backend and decorator.
///
/// All operations take `&self`; implementations synchronize internally.
/// After [`Queue::on_remove`] every operation returns [`QueueError::Removed`].
pub trait Queue<T>: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> QueueKind;

    /// Maximum number of buffered items (0 for [`NullQueue`]).
    fn capacity(&self) -> usize;

    /// Temporary queues are never persisted, whatever the decorator.
    fn is_temporary(&self) -> bool;

    fn is_durable(&self) -> bool;

    /// Number of buffered items.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Enqueue without waiting. `Ok(false)` means the item was rejected.
    fn offer(&self, item: T) -> Result<bool> {
        self.offer_timeout(item, Duration::ZERO)
    }

    /// Enqueue, waiting up to `timeout` for room where the backend supports it.
    fn offer_timeout(&self, item: T, timeout: Duration) -> Result<bool>;

    /// Dequeue without waiting.
    fn poll(&self) -> Result<Option<T>> {
        self.poll_timeout(Duration::ZERO)
    }

    /// Dequeue, waiting up to `timeout` for an item where the backend supports it.
    fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>>;

    /// Drop every buffered item and return how many were dropped.
    fn clear(&self) -> Result<usize>;

    /// Release all buffered state. Callable once.
    fn on_remove(&self) -> Result<()>;
}

impl<T, Q> Queue<T> for Box<Q>
where
    Q: Queue<T> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn kind(&self) -> QueueKind {
        (**self).kind()
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn is_temporary(&self) -> bool {
        (**self).is_temporary()
    }

    fn is_durable(&self) -> bool {
        (**self).is_durable()
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn is_empty(&self) -> Result<bool> {
        (**self).is_empty()
    }

    fn offer(&self, item: T) -> Result<bool> {
        (**self).offer(item)
    }

    fn offer_timeout(&self, item: T, timeout: Duration) -> Result<bool> {
        (**self).offer_timeout(item, timeout)
    }

    fn poll(&self) -> Result<Option<T>> {
        (**self).poll()
    }

    fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        (**self).poll_timeout(timeout)
    }

    fn clear(&self) -> Result<usize> {
        (**self).clear()
    }

    fn on_remove(&self) -> Result<()> {
        (**self).on_remove()
    }
}
