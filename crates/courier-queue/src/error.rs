/// Errors returned by queue operations.
///
/// A full queue or an empty queue is not an error: `offer` returns
/// `Ok(false)` and `poll` returns `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue was removed with `on_remove` and can no longer be used.
    #[error("queue '{0}' has been removed")]
    Removed(String),

    /// A decorator's backing storage failed.
    #[error("queue storage failure: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl QueueError {
    /// Wrap a storage error raised by a decorating queue.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        QueueError::Storage(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
