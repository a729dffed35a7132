use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use courier_frame::Message;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    status: &'a str,
    mimetype: &'a str,
    charset: Option<&'a str>,
    id: Option<String>,
    expires_at: Option<u64>,
    payload_size: usize,
    payload: String,
    peer: &'a str,
}

pub fn print_message(message: &Message, peer: &str, format: OutputFormat) {
    let charset = message.charset().map(|charset| charset.name());
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                status: message.status().as_str(),
                mimetype: message.mimetype(),
                charset,
                id: message.id().map(|id| id.to_string()),
                expires_at: message.expires_at(),
                payload_size: message.payload().len(),
                payload: payload_preview(message),
                peer,
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STATUS", "MIMETYPE", "CHARSET", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    message.status().as_str().to_string(),
                    message.mimetype().to_string(),
                    charset.unwrap_or("-").to_string(),
                    message.payload().len().to_string(),
                    peer.to_string(),
                    payload_preview(message),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "status={} mimetype={} charset={} size={} peer={} payload={}",
                message.status(),
                message.mimetype(),
                charset.unwrap_or("-"),
                message.payload().len(),
                peer,
                payload_preview(message)
            );
        }
        OutputFormat::Raw => {
            print_raw(message.payload());
        }
    }
}

/// Print a serializable report, or a two-column table of its fields.
pub fn print_report<T: Serialize>(report: &T, rows: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in rows {
                table.add_row(vec![field.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (field, value) in rows {
                println!("{field}: {value}");
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(message: &Message) -> String {
    match message.text_payload() {
        Ok(text) => text,
        Err(_) => match std::str::from_utf8(message.payload()) {
            Ok(text) => text.to_string(),
            Err(_) => format!("<binary {} bytes>", message.payload().len()),
        },
    }
}
