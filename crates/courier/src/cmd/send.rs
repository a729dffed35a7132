use std::fs;
use std::time::Duration;

use courier_frame::{Message, Protocol, ProtocolConfig, Status};
use courier_peer::{ClientConfig, TcpClient};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = build_request(&args)?;

    let client = TcpClient::new(args.addr, client_config(timeout));
    client
        .open()
        .map_err(|err| peer_error("connect failed", err))?;
    let reply = client
        .send_message(&request)
        .map_err(|err| peer_error("request failed", err))?;
    let _ = client.close();

    print_message(&reply, &args.addr.to_string(), format);
    Ok(SUCCESS)
}

fn client_config(timeout: Duration) -> ClientConfig {
    ClientConfig {
        protocol: Protocol::new(ProtocolConfig {
            read_timeout: Some(timeout),
            write_timeout: Some(timeout),
            ..ProtocolConfig::default()
        }),
        connect_timeout: Some(timeout),
    }
}

fn build_request(args: &SendArgs) -> CliResult<Message> {
    if let Some(text) = &args.text {
        let mimetype = args.mimetype.as_deref().unwrap_or("text/plain");
        return Message::text(Status::Request, mimetype, &args.charset, text).map_err(|err| {
            CliError::new(DATA_INVALID, format!("cannot encode --text: {err}"))
        });
    }
    if let Some(path) = &args.file {
        let data = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        let mimetype = args
            .mimetype
            .as_deref()
            .unwrap_or("application/octet-stream");
        return Ok(Message::binary(Status::Request, mimetype, data));
    }
    Err(CliError::new(USAGE, "one of --text or --file is required"))
}
