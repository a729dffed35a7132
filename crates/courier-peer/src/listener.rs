use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use courier_frame::Message;
use tracing::{debug, warn};

use crate::client::TcpClient;
use crate::connection::Connection;
use crate::error::{PeerError, Result};

/// Something a listener can pull messages from.
pub trait MessageSource: Send + Sync + 'static {
    /// Block until one message arrives.
    fn receive_message(&self) -> Result<Message>;

    /// Close the underlying channel, waking a blocked receive.
    fn close(&self) -> Result<()>;
}

impl MessageSource for TcpClient {
    fn receive_message(&self) -> Result<Message> {
        TcpClient::receive_message(self)
    }

    fn close(&self) -> Result<()> {
        TcpClient::close(self)
    }
}

impl MessageSource for Connection {
    fn receive_message(&self) -> Result<Message> {
        Connection::receive_message(self)
    }

    fn close(&self) -> Result<()> {
        Connection::close(self)
    }
}

impl<S: MessageSource> MessageSource for Arc<S> {
    fn receive_message(&self) -> Result<Message> {
        (**self).receive_message()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}

/// How a listener loop ended.
#[derive(Debug)]
pub struct ListenerExit {
    /// Messages handed to the handler, including ones it failed on.
    pub delivered: u64,
    /// Handler calls that returned an error or panicked.
    pub handler_failures: u64,
    /// The receive error that ended the loop.
    pub error: Option<PeerError>,
}

/// Background thread that feeds every received message to a handler.
///
/// The loop ends for good on the first receive error, which includes the
/// source being closed. Handler failures are logged and skipped.
pub struct SubscriptionListener<S: MessageSource> {
    source: Arc<S>,
    handle: JoinHandle<ListenerExit>,
    finished: Arc<AtomicBool>,
}

impl<S: MessageSource> SubscriptionListener<S> {
    pub fn spawn<F, E>(source: Arc<S>, mut handler: F) -> Result<Self>
    where
        F: FnMut(Message) -> std::result::Result<(), E> + Send + 'static,
        E: Display,
    {
        let finished = Arc::new(AtomicBool::new(false));
        let thread_source = Arc::clone(&source);
        let thread_finished = Arc::clone(&finished);

        let handle = thread::Builder::new()
            .name("courier-subscription".into())
            .spawn(move || {
                let exit = run(&*thread_source, &mut handler);
                thread_finished.store(true, Ordering::Release);
                exit
            })
            .map_err(|err| PeerError::state(format!("failed to spawn listener thread: {err}")))?;

        Ok(Self {
            source,
            handle,
            finished,
        })
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Close the source and wait for the loop to end.
    pub fn stop(self) -> Result<ListenerExit> {
        self.source.close()?;
        self.join()
    }

    /// Wait for the loop to end on its own.
    pub fn join(self) -> Result<ListenerExit> {
        self.handle
            .join()
            .map_err(|_| PeerError::state("listener thread panicked"))
    }
}

fn run<S, F, E>(source: &S, handler: &mut F) -> ListenerExit
where
    S: MessageSource + ?Sized,
    F: FnMut(Message) -> std::result::Result<(), E>,
    E: Display,
{
    let mut delivered = 0;
    let mut handler_failures = 0;

    let error = loop {
        let message = match source.receive_message() {
            Ok(message) => message,
            Err(err) => break err,
        };
        delivered += 1;

        match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                handler_failures += 1;
                warn!(error = %err, "subscription handler failed");
            }
            Err(payload) => {
                handler_failures += 1;
                warn!(panic = panic_message(&*payload), "subscription handler panicked");
            }
        }
    };

    debug!(delivered, handler_failures, error = %error, "subscription listener stopped");
    ListenerExit {
        delivered,
        handler_failures,
        error: Some(error),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
