use mcsaab_frame::{Frame, FrameWriter, PacketType};
use serde::Serialize;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::hex;
use crate::output::{print_fields, print_json, FrameOutput, OutputFormat};

#[derive(Debug, Serialize)]
struct EncodeOutput {
    frame: FrameOutput,
    wire: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = build_frame(&args)?;
    let wire = encode_to_vec(&frame).map_err(|err| frame_error("encode", err))?;
    let out = EncodeOutput {
        frame: FrameOutput::new(&frame),
        wire: hex::encode(&wire),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_fields(
            "frame",
            &[
                ("type", out.frame.packet_type.to_string()),
                ("payload_len", out.frame.payload_len.to_string()),
                ("wire_size", out.frame.wire_size.to_string()),
                ("wire", out.wire.clone()),
            ],
            format,
        ),
        OutputFormat::Pretty => println!("{}", out.wire),
    }
    Ok(SUCCESS)
}

fn build_frame(args: &EncodeArgs) -> CliResult<Frame> {
    let packet_type = PacketType::from_name(&args.packet_type).ok_or_else(|| {
        let names: Vec<&str> = PacketType::ALL.iter().map(|ty| ty.name()).collect();
        CliError::usage(format!(
            "unknown packet type {:?} (expected one of {})",
            args.packet_type,
            names.join(", ").to_lowercase()
        ))
    })?;
    let payload = hex::decode(&args.data).map_err(|err| CliError::new(DATA_INVALID, err))?;

    let built = match packet_type {
        PacketType::Command => Frame::command(args.header_field, payload),
        PacketType::Acl => Frame::acl(args.header_field, payload),
        PacketType::Sco => Frame::sco(args.header_field, payload),
        PacketType::Event => Frame::event(one_byte(args.header_field)?, payload),
        PacketType::Radio => Frame::radio(one_byte(args.header_field)?, payload),
        PacketType::Negotiation => Frame::negotiation(payload),
        PacketType::Alive => Frame::alive(payload),
    };
    built.map_err(|err| frame_error("encode", err))
}

fn one_byte(field: u16) -> CliResult<u8> {
    u8::try_from(field)
        .map_err(|_| CliError::usage(format!("header field {field:#x} does not fit in one byte")))
}

fn encode_to_vec(frame: &Frame) -> mcsaab_frame::Result<Vec<u8>> {
    let mut writer = FrameWriter::new(Vec::new());
    writer.write_frame(frame)?;
    Ok(writer.into_inner())
}
