use clap::{Args, Subcommand};
use std::path::PathBuf;

use mcsaab_frame::DEFAULT_RX_CAPACITY;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a captured H4+ byte stream.
    Decode(DecodeArgs),
    /// Print the wire bytes of a single frame.
    Encode(EncodeArgs),
    /// Negotiate with an emulated controller and exchange frames.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file to read (`-` for stdin).
    pub file: PathBuf,
    /// Treat the input as hex text instead of raw bytes.
    #[arg(long)]
    pub hex: bool,
    /// Receive buffer capacity in payload bytes.
    #[arg(long, default_value_t = DEFAULT_RX_CAPACITY)]
    pub capacity: usize,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Packet type: command, acl, sco, event, negotiation, alive or radio.
    #[arg(long = "type", value_name = "TYPE")]
    pub packet_type: String,
    /// Opcode, connection handle or event code, depending on the type.
    #[arg(long, default_value_t = 0, value_parser = parse_u16)]
    pub header_field: u16,
    /// Payload as hex.
    #[arg(long, default_value = "")]
    pub data: String,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Link configuration as JSON; missing fields take their defaults.
    #[arg(long, value_name = "FILE", env = "MCSAAB_CONFIG")]
    pub config: Option<PathBuf>,
    /// Frames to send in each direction.
    #[arg(long, default_value_t = 3)]
    pub frames: usize,
    /// Manufacturer id the emulated controller reports.
    #[arg(long, default_value = "0x01", value_parser = parse_u8)]
    pub man_id: u8,
    /// Version id the emulated controller reports.
    #[arg(long, default_value = "0x06", value_parser = parse_u8)]
    pub ver_id: u8,
    /// Make the emulated controller reject the negotiation.
    #[arg(long)]
    pub reject: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_u16(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid number {value:?}: {err}"))
}

fn parse_u8(value: &str) -> Result<u8, String> {
    let wide = parse_u16(value)?;
    u8::try_from(wide).map_err(|_| format!("{value} does not fit in one byte"))
}
