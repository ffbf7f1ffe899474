use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mcsaab_frame::Frame;
use serde::Serialize;

use crate::hex;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

/// One decoded frame as shown to the user.
#[derive(Debug, Serialize)]
pub struct FrameOutput {
    pub packet_type: &'static str,
    pub tag: u8,
    pub fields: String,
    pub payload_len: usize,
    pub wire_size: usize,
    pub payload: String,
}

impl FrameOutput {
    pub fn new(frame: &Frame) -> Self {
        Self {
            packet_type: frame.packet_type.name(),
            tag: frame.packet_type.as_u8(),
            fields: hex::encode(frame.fields()),
            payload_len: frame.payload.len(),
            wire_size: frame.wire_size(),
            payload: hex::encode(&frame.payload),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_frames(frames: &[FrameOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&frames),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "FIELDS", "LEN", "WIRE", "PAYLOAD"]);
            for frame in frames {
                table.add_row(vec![
                    frame.packet_type.to_string(),
                    frame.fields.clone(),
                    frame.payload_len.to_string(),
                    frame.wire_size.to_string(),
                    frame.payload.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for frame in frames {
                println!("{}", pretty_frame(frame));
            }
        }
    }
}

/// Key/value report for table and pretty output. JSON output serialises
/// the command's own report struct instead.
pub fn print_fields(title: &str, fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![title.to_uppercase(), String::new()]);
            for (key, value) in fields {
                table.add_row(vec![key.to_string(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Json => {
            let line: Vec<String> = fields
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            println!("{title}: {}", line.join(" "));
        }
    }
}

fn pretty_frame(frame: &FrameOutput) -> String {
    let mut line = format!("{} len={}", frame.packet_type, frame.payload_len);
    if !frame.fields.is_empty() {
        line.push_str(&format!(" fields=[{}]", frame.fields));
    }
    if !frame.payload.is_empty() {
        line.push_str(&format!(" payload=[{}]", frame.payload));
    }
    line
}
