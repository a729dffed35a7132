use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use courier_peer::{Connection, PeerError, ServerConfig, TcpServer};

use crate::cmd::EchoArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::OutputFormat;

enum RecvErrorDisposition {
    Break,
    Fatal(PeerError),
}

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    if !args.addr.ip().is_loopback() {
        return Err(CliError::new(
            USAGE,
            format!("echo only binds loopback addresses, got {}", args.addr),
        ));
    }

    let server = TcpServer::new(ServerConfig {
        port: args.addr.port(),
        ..ServerConfig::default()
    });
    let bound = server
        .start()
        .map_err(|err| peer_error("bind failed", err))?;
    tracing::info!(addr = %bound, "echo server ready");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), server.clone())?;

    let mut workers = Vec::new();
    let mut served = 0usize;
    while running.load(Ordering::SeqCst) {
        if args.connections.is_some_and(|limit| served >= limit) {
            break;
        }
        let connection = match server.accept() {
            Ok(connection) => connection,
            Err(PeerError::State(_)) if !running.load(Ordering::SeqCst) => break,
            Err(err) => return Err(peer_error("accept failed", err)),
        };
        served += 1;

        let worker = thread::Builder::new()
            .name(format!("echo-{}", connection.peer_addr()))
            .spawn(move || serve(connection))
            .map_err(|err| {
                CliError::new(
                    crate::exit::INTERNAL,
                    format!("failed to spawn connection thread: {err}"),
                )
            })?;
        workers.push(worker);
    }

    for worker in workers {
        let _ = worker.join();
    }
    let _ = server.close();
    Ok(SUCCESS)
}

fn serve(connection: Connection) {
    let peer = connection.peer_addr();
    loop {
        let message = match connection.receive_message() {
            Ok(message) => message,
            Err(err) => match classify_recv_error(err) {
                RecvErrorDisposition::Break => break,
                RecvErrorDisposition::Fatal(err) => {
                    tracing::warn!(%peer, error = %err, "dropping connection");
                    break;
                }
            },
        };

        tracing::info!(
            %peer,
            status = %message.status(),
            mimetype = message.mimetype(),
            size = message.payload().len(),
            "echoing message"
        );

        if let Err(err) = connection.send_message(&message.echo()) {
            tracing::warn!(%peer, error = %err, "echo send failed");
            break;
        }
    }
    let _ = connection.close();
}

fn install_ctrlc_handler(running: Arc<AtomicBool>, server: TcpServer) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        let _ = server.close();
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

fn classify_recv_error(err: PeerError) -> RecvErrorDisposition {
    match err {
        PeerError::Disconnected(_) | PeerError::State(_) => RecvErrorDisposition::Break,
        other => RecvErrorDisposition::Fatal(other),
    }
}
