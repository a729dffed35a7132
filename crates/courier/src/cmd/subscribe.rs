use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use courier_peer::{ClientConfig, PeerError, SubscriptionListener, TcpClient};

use crate::cmd::SubscribeArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: SubscribeArgs, format: OutputFormat) -> CliResult<i32> {
    let client = Arc::new(TcpClient::new(args.addr, ClientConfig::default()));
    client
        .open()
        .map_err(|err| peer_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel::<()>();
    let peer = args.addr.to_string();
    let listener = SubscriptionListener::spawn(Arc::clone(&client), move |message| {
        print_message(&message, &peer, format);
        tx.send(()).map_err(|_| "subscriber stopped")
    })
    .map_err(|err| peer_error("listener failed", err))?;

    let mut printed = 0u64;
    while running.load(Ordering::SeqCst) && !reached(args.count, printed) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) => printed += 1,
            Err(mpsc::RecvTimeoutError::Timeout) if !listener.is_finished() => {}
            Err(_) => break,
        }
    }

    let ended_by_server = running.load(Ordering::SeqCst) && !reached(args.count, printed);
    let exit = if ended_by_server {
        listener.join()
    } else {
        listener.stop()
    }
    .map_err(|err| peer_error("listener failed", err))?;

    tracing::debug!(delivered = exit.delivered, "subscription ended");
    match exit.error {
        // The server hung up or we closed the client ourselves.
        None | Some(PeerError::Disconnected(_)) | Some(PeerError::State(_)) => Ok(SUCCESS),
        Some(err) => Err(peer_error("receive failed", err)),
    }
}

fn reached(count: Option<u64>, printed: u64) -> bool {
    count.is_some_and(|count| printed >= count)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
