use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpcmux_event::Event;
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
struct EventOutput<'a> {
    name: &'a str,
    args: &'a [serde_json::Value],
    message_id: Option<&'a str>,
    response_to: Option<&'a str>,
    timestamp: String,
}

pub fn print_event(event: &Event, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                name: event.name(),
                args: event.args(),
                message_id: event.message_id(),
                response_to: event.response_to(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "CHANNEL", "ARGS"])
                .add_row(vec![
                    event.name().to_string(),
                    event.response_to().unwrap_or("-").to_string(),
                    args_preview(event.args()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "name={} channel={} args={}",
                event.name(),
                event.response_to().unwrap_or("-"),
                args_preview(event.args())
            );
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout();
            let _ = out.write_all(args_preview(event.args()).as_bytes());
            let _ = out.write_all(b"\n");
            let _ = out.flush();
        }
    }
}

fn args_preview(args: &[serde_json::Value]) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
