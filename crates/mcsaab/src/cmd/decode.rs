use std::io::Read;
use std::path::Path;

use mcsaab_frame::{FrameDecoder, FrameError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::hex;
use crate::output::{print_fields, print_frames, print_json, FrameOutput, OutputFormat};

#[derive(Debug, Serialize)]
struct DecodeStats {
    input_bytes: usize,
    frames: u64,
    rx_errors: u64,
    oversized: u64,
    garbage_skipped: u64,
    garbage_pending: usize,
    trailing_partial: bool,
}

#[derive(Debug, Serialize)]
struct DecodeOutput {
    frames: Vec<FrameOutput>,
    errors: Vec<String>,
    stats: DecodeStats,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.capacity == 0 {
        return Err(CliError::usage("--capacity must be at least 1"));
    }
    let raw = read_input(&args.file)?;
    let bytes = if args.hex {
        let text = String::from_utf8(raw)
            .map_err(|_| CliError::new(DATA_INVALID, "hex input is not valid UTF-8"))?;
        hex::decode(&text).map_err(|err| CliError::new(DATA_INVALID, err))?
    } else {
        raw
    };

    let out = decode_bytes(&bytes, args.capacity);
    debug!(
        frames = out.frames.len(),
        errors = out.errors.len(),
        "decoded capture"
    );

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            print_frames(&out.frames, format);
            for err in &out.errors {
                println!("error: {err}");
            }
            print_fields("decoder", &stats_fields(&out.stats), format);
        }
    }

    if out.errors.is_empty() {
        Ok(SUCCESS)
    } else {
        Ok(DATA_INVALID)
    }
}

fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| io_error("read stdin", err))?;
        return Ok(buf);
    }
    std::fs::read(path).map_err(|err| io_error(&format!("read {}", path.display()), err))
}

fn decode_bytes(bytes: &[u8], capacity: usize) -> DecodeOutput {
    let mut decoder = FrameDecoder::with_capacity(capacity);
    let mut frames = Vec::new();
    let mut errors = Vec::new();

    for result in decoder.feed(bytes) {
        match result {
            Ok(frame) => frames.push(FrameOutput::new(&frame)),
            Err(err) => {
                if !err.is_recoverable() {
                    warn!(error = %err, "decoder error");
                }
                errors.push(describe(&err));
            }
        }
    }

    let stats = decoder.stats();
    DecodeOutput {
        frames,
        errors,
        stats: DecodeStats {
            input_bytes: bytes.len(),
            frames: stats.frames,
            rx_errors: stats.rx_errors,
            oversized: stats.oversized,
            garbage_skipped: stats.garbage_skipped,
            garbage_pending: decoder.garbage_bytes(),
            trailing_partial: !decoder.is_idle() && decoder.garbage_bytes() == 0,
        },
    }
}

fn describe(err: &FrameError) -> String {
    match err {
        FrameError::FrameTooLarge { declared, capacity } => format!(
            "{err}; skipping {} bytes",
            declared.saturating_sub(*capacity)
        ),
        other => other.to_string(),
    }
}

fn stats_fields(stats: &DecodeStats) -> Vec<(&'static str, String)> {
    vec![
        ("input_bytes", stats.input_bytes.to_string()),
        ("frames", stats.frames.to_string()),
        ("rx_errors", stats.rx_errors.to_string()),
        ("oversized", stats.oversized.to_string()),
        ("garbage_skipped", stats.garbage_skipped.to_string()),
        ("garbage_pending", stats.garbage_pending.to_string()),
        ("trailing_partial", stats.trailing_partial.to_string()),
    ]
}
