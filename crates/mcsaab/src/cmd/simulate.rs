use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use mcsaab_channel::MemoryChannel;
use mcsaab_frame::Frame;
use mcsaab_link::{
    Emulator, EmulatorConfig, EmulatorStats, Link, LinkConfig, LinkStatus, Notification, PeerInfo,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::SimulateArgs;
use crate::exit::{
    frame_error, io_error, link_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT,
};
use crate::output::{print_fields, print_json, OutputFormat};

const FRAME_WAIT: Duration = Duration::from_secs(3);
const ACL_HANDLE: u16 = 0x0001;
const VENDOR_EVENT: u8 = 0xff;

#[derive(Debug, Serialize)]
struct SimulateOutput {
    peer: PeerInfo,
    host_to_controller: usize,
    controller_to_host: usize,
    elapsed_ms: f64,
    link: LinkStatus,
    controller: EmulatorStats,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => LinkConfig::default(),
    };
    let emulator_config = EmulatorConfig {
        man_id: args.man_id,
        ver_id: args.ver_id,
        speed: config.speed,
        reject_negotiation: args.reject,
        echo: false,
    };

    let started = Instant::now();
    let (host, controller) = MemoryChannel::pair();
    let emulator =
        Emulator::spawn(controller, emulator_config).map_err(|err| link_error("emulator", err))?;
    let (link, notifications) =
        Link::spawn(host, config).map_err(|err| link_error("link", err))?;

    let peer = link.negotiate().map_err(|err| link_error("negotiate", err))?;
    info!(
        man_id = peer.man_id,
        ver_id = peer.ver_id,
        speed = peer.speed,
        "link up"
    );

    for i in 0..args.frames {
        let sent = Frame::acl(ACL_HANDLE, format!("host frame {i}").into_bytes())
            .map_err(|err| frame_error("build", err))?;
        link.enqueue(sent.clone())
            .map_err(|err| link_error("enqueue", err))?;
        let got = emulator.recv_frame_timeout(FRAME_WAIT).ok_or_else(|| {
            CliError::new(TIMEOUT, format!("controller did not receive frame {i}"))
        })?;
        if got != sent {
            return Err(CliError::new(
                FAILURE,
                format!("controller received a different frame {i}"),
            ));
        }
        debug!(frame = i, "host to controller");
    }

    for i in 0..args.frames {
        let sent = Frame::event(VENDOR_EVENT, format!("controller frame {i}").into_bytes())
            .map_err(|err| frame_error("build", err))?;
        emulator
            .send(sent.clone())
            .map_err(|err| link_error("emulator", err))?;
        let got = next_frame(&notifications)?;
        if got != sent {
            return Err(CliError::new(
                FAILURE,
                format!("host received a different frame {i}"),
            ));
        }
        debug!(frame = i, "controller to host");
    }

    let out = SimulateOutput {
        peer,
        host_to_controller: args.frames,
        controller_to_host: args.frames,
        elapsed_ms: (started.elapsed().as_secs_f64() * 1000.0 * 100.0).round() / 100.0,
        link: link.status(),
        controller: emulator.stats(),
    };
    print_report(&out, format);
    Ok(SUCCESS)
}

fn load_config(path: &Path) -> CliResult<LinkConfig> {
    let json = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("read {}", path.display()), err))?;
    LinkConfig::from_json(&json).map_err(|err| link_error("config", err))
}

/// Next frame from the link, skipping link-up noise.
fn next_frame(notifications: &Receiver<Notification>) -> CliResult<Frame> {
    let deadline = Instant::now() + FRAME_WAIT;
    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        match notifications.recv_timeout(wait) {
            Ok(Notification::Frame(frame)) => return Ok(frame),
            Ok(Notification::LinkDown { kind, reason })
            | Ok(Notification::HandshakeFailed { kind, reason }) => {
                return Err(CliError::new(FAILURE, format!("link lost ({kind}): {reason}")));
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(TIMEOUT, "host did not receive a frame"));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(FAILURE, "link stopped"));
            }
        }
    }
}

fn print_report(out: &SimulateOutput, format: OutputFormat) {
    if matches!(format, OutputFormat::Json) {
        print_json(out);
        return;
    }
    let stats = out.link.stats;
    print_fields(
        "simulation",
        &[
            ("state", out.link.main_state.as_str().to_string()),
            ("man_id", format!("{:#04x}", out.peer.man_id)),
            ("ver_id", format!("{:#04x}", out.peer.ver_id)),
            ("speed", out.peer.speed.to_string()),
            ("frames_sent", stats.frames_sent.to_string()),
            ("frames_received", stats.frames_received.to_string()),
            ("rx_errors", stats.rx_errors.to_string()),
            ("control_dropped", stats.control_dropped.to_string()),
            ("handshakes", stats.handshakes.to_string()),
            ("tx_id", out.link.tx_id.to_string()),
            ("rx_id", out.link.rx_id.to_string()),
            ("elapsed_ms", out.elapsed_ms.to_string()),
        ],
        format,
    );
}
