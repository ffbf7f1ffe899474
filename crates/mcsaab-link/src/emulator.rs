//! Controller emulator.
//!
//! Plays the chip side of a [`MemoryChannel`] pair: answers negotiation and
//! alive requests, grants READY when the host raises its wake line, reads
//! announced transfers, and sends frames back with the same wake, READY,
//! START_TRANS, SW_BREAK sequence the host uses.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use mcsaab_channel::{ChannelEvent, LinkChannel, MemoryChannel};
use mcsaab_frame::{
    decode_frame, encode_frame, AlivePacket, ControlWord, Frame, FrameDecoder, NegotiationRequest,
    NegotiationResponse, PacketType, DEFAULT_RX_CAPACITY, NEG_NAK, PROTO_BYTE,
};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{LinkError, Result};

const RX_CHUNK: usize = 256;

/// How the emulated controller behaves.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Manufacturer id reported in the negotiation response.
    pub man_id: u8,
    /// Version id reported in the negotiation response.
    pub ver_id: u8,
    /// Line speed switched to after answering a negotiation.
    pub speed: u32,
    /// Answer negotiation requests with NAK.
    pub reject_negotiation: bool,
    /// Send every received frame back.
    pub echo: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            man_id: 0x01,
            ver_id: 0x06,
            speed: 3_000_000,
            reject_negotiation: false,
            echo: false,
        }
    }
}

/// Counters kept by the emulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmulatorStats {
    pub negotiations: u64,
    pub alive_checks: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub rx_errors: u64,
}

enum Input {
    Channel(ChannelEvent),
    Send(Frame),
    Reboot,
    PulseReset,
    Shutdown,
}

/// A running controller emulator.
pub struct Emulator {
    inputs: Sender<Input>,
    frames: Receiver<Frame>,
    stats: Arc<Mutex<EmulatorStats>>,
    worker: Option<JoinHandle<()>>,
}

impl Emulator {
    /// Start emulating on `channel`, normally the second end of
    /// [`MemoryChannel::pair`].
    pub fn spawn(mut channel: MemoryChannel, config: EmulatorConfig) -> Result<Self> {
        let (inputs, queue) = mpsc::channel();
        let (frames_tx, frames) = mpsc::channel();
        let stats = Arc::new(Mutex::new(EmulatorStats::default()));

        let events = inputs.clone();
        channel.set_notifier(Arc::new(move |event| {
            let _ = events.send(Input::Channel(event));
        }));

        let controller = Controller::new(channel, config, Arc::clone(&stats), frames_tx);
        let worker = thread::Builder::new()
            .name("mcsaab-emulator".into())
            .spawn(move || controller.run(queue))
            .map_err(|err| LinkError::Fault(format!("cannot start emulator: {err}")))?;

        Ok(Self {
            inputs,
            frames,
            stats,
            worker: Some(worker),
        })
    }

    /// Send a frame to the host.
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.post(Input::Send(frame))
    }

    /// Next frame received from the host.
    pub fn recv_frame_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.frames.recv_timeout(timeout).ok()
    }

    /// Forget the link and send a fresh negotiation request, the way a
    /// rebooted controller does.
    pub fn reboot(&self) {
        let _ = self.post(Input::Reboot);
    }

    /// Pulse the reset line towards the host.
    pub fn pulse_reset(&self) {
        let _ = self.post(Input::PulseReset);
    }

    pub fn stats(&self) -> EmulatorStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, input: Input) -> Result<()> {
        self.inputs.send(input).map_err(|_| LinkError::Stopped)
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        let _ = self.inputs.send(Input::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("emulator worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for Emulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emulator")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxPhase {
    Idle,
    WaitReady,
    Sending,
    Breaking,
}

struct Controller {
    channel: MemoryChannel,
    config: EmulatorConfig,
    stats: Arc<Mutex<EmulatorStats>>,
    frames: Sender<Frame>,

    decoder: FrameDecoder,
    rx_id: u8,
    tx_id: u8,
    rx_transfer: Option<(Vec<u8>, usize)>,
    rx_pending: VecDeque<u16>,
    rx_early: BytesMut,

    tx_queue: VecDeque<Frame>,
    tx_phase: TxPhase,
    host_ready: bool,
    tx_current: Option<BytesMut>,
    controls: VecDeque<ControlWord>,
    /// One entry per outstanding data write; true for transfers.
    writes: VecDeque<bool>,
}

impl Controller {
    fn new(
        channel: MemoryChannel,
        config: EmulatorConfig,
        stats: Arc<Mutex<EmulatorStats>>,
        frames: Sender<Frame>,
    ) -> Self {
        Self {
            channel,
            config,
            stats,
            frames,
            decoder: FrameDecoder::with_capacity(DEFAULT_RX_CAPACITY),
            rx_id: 0,
            tx_id: 0,
            rx_transfer: None,
            rx_pending: VecDeque::new(),
            rx_early: BytesMut::new(),
            tx_queue: VecDeque::new(),
            tx_phase: TxPhase::Idle,
            host_ready: false,
            tx_current: None,
            controls: VecDeque::new(),
            writes: VecDeque::new(),
        }
    }

    fn run(mut self, queue: Receiver<Input>) {
        while let Ok(input) = queue.recv() {
            match input {
                Input::Channel(event) => {
                    trace!(%event, "emulator event");
                    if let Err(err) = self.on_event(event) {
                        warn!(error = %err, "emulator channel error");
                    }
                }
                Input::Send(frame) => self.queue_frame(frame),
                Input::Reboot => {
                    debug!("emulator rebooting");
                    self.forget();
                    let request = NegotiationRequest::new(0x01a1, PROTO_BYTE, 38_400);
                    if let Err(err) = self.write_link_frame(&request.into_frame()) {
                        warn!(error = %err, "emulator reboot request failed");
                    }
                }
                Input::PulseReset => {
                    self.forget();
                    self.channel.pulse_reset();
                }
                Input::Shutdown => break,
            }
        }
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, EmulatorStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop all transfer state.
    fn forget(&mut self) {
        self.decoder.reset();
        self.rx_id = 0;
        self.tx_id = 0;
        self.rx_transfer = None;
        self.rx_pending.clear();
        self.rx_early.clear();
        self.tx_queue.clear();
        self.tx_phase = TxPhase::Idle;
        self.host_ready = false;
        self.tx_current = None;
        self.controls.clear();
        self.writes.clear();
        self.channel.set_local_wake(false);
    }

    fn on_event(&mut self, event: ChannelEvent) -> Result<()> {
        match event {
            ChannelEvent::DataReady => self.pump(),
            ChannelEvent::Control(raw) => self.on_control(raw),
            ChannelEvent::ControlWriteComplete => self.on_control_sent(),
            ChannelEvent::WriteComplete => self.on_write_sent(),
            ChannelEvent::PeerWake(true) => self.send_control(ControlWord::Ready),
            ChannelEvent::PeerWake(false) | ChannelEvent::TxEmpty => Ok(()),
            ChannelEvent::PeerReset | ChannelEvent::Fault(_) => {
                self.forget();
                Ok(())
            }
        }
    }

    fn write_link_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_frame(frame, &mut buf)?;
        self.writes.push_back(false);
        self.channel.write(&buf)?;
        Ok(())
    }

    fn send_control(&mut self, word: ControlWord) -> Result<()> {
        self.controls.push_back(word);
        self.channel.write_control(word.to_u32())?;
        Ok(())
    }

    fn pump(&mut self) -> Result<()> {
        loop {
            if let Some((buf, filled)) = self.rx_transfer.as_mut() {
                let dst = &mut buf[*filled..];
                let n = if self.rx_early.is_empty() {
                    self.channel.read_into(dst)?
                } else {
                    let n = self.rx_early.len().min(dst.len());
                    dst[..n].copy_from_slice(&self.rx_early.split_to(n));
                    n
                };
                if n == 0 {
                    return Ok(());
                }
                *filled += n;
                if *filled == buf.len() {
                    self.finish_transfer()?;
                }
            } else {
                let mut chunk = [0u8; RX_CHUNK];
                let n = self.channel.read_into(&mut chunk)?;
                if n == 0 {
                    return Ok(());
                }
                self.rx_early.extend_from_slice(&chunk[..n]);
                let link_control = !self.decoder.is_idle()
                    || self
                        .rx_early
                        .first()
                        .is_some_and(|tag| {
                            PacketType::from_u8(*tag).is_none_or(PacketType::is_link_control)
                        });
                if link_control {
                    let bytes = self.rx_early.split();
                    for result in self.decoder.feed(&bytes) {
                        match result {
                            Ok(frame) => self.on_stream_frame(&frame)?,
                            Err(err) => {
                                self.stats().rx_errors += 1;
                                debug!(error = %err, "emulator stream input dropped");
                            }
                        }
                    }
                }
            }
        }
    }

    fn on_stream_frame(&mut self, frame: &Frame) -> Result<()> {
        match frame.packet_type {
            PacketType::Negotiation => {
                let request = NegotiationRequest::parse(&frame.payload)?;
                let mut response =
                    NegotiationResponse::accept(&request, self.config.man_id, self.config.ver_id);
                if self.config.reject_negotiation {
                    response.ack = NEG_NAK;
                }
                debug!(
                    baud_divisor = request.baud,
                    mode = request.mode,
                    ack = response.ack,
                    "emulator answering negotiation"
                );

                self.forget();
                self.stats().negotiations += 1;
                self.channel.set_rts(true);
                self.write_link_frame(&response.into_frame())?;
                if !self.config.reject_negotiation {
                    self.channel.set_speed(self.config.speed)?;
                }
                Ok(())
            }
            PacketType::Alive => {
                if AlivePacket::parse(&frame.payload)?.is_request() {
                    self.stats().alive_checks += 1;
                    self.write_link_frame(&AlivePacket::response().into_frame())?;
                }
                Ok(())
            }
            other => {
                self.stats().rx_errors += 1;
                debug!(packet_type = %other, "emulator dropped unannounced frame");
                Ok(())
            }
        }
    }

    fn on_control(&mut self, raw: u32) -> Result<()> {
        match ControlWord::from_u32(raw)? {
            ControlWord::StartTrans { len, msg_id } => {
                let queued = self.rx_pending.len() + usize::from(self.rx_transfer.is_some());
                let expected = self.rx_id.wrapping_add(queued as u8);
                if msg_id != expected {
                    warn!(msg_id, expected, "emulator saw an out of sequence transfer");
                    self.stats().rx_errors += 1;
                }
                if self.rx_transfer.is_some() {
                    self.rx_pending.push_back(len);
                } else {
                    self.rx_transfer = Some((vec![0; usize::from(len) * 4], 0));
                }
                self.pump()
            }
            ControlWord::Ready => {
                self.host_ready = true;
                if self.tx_phase == TxPhase::WaitReady {
                    self.start_next()?;
                }
                Ok(())
            }
            word => {
                trace!(%word, "emulator control word");
                Ok(())
            }
        }
    }

    fn finish_transfer(&mut self) -> Result<()> {
        if let Some((buf, _)) = self.rx_transfer.take() {
            self.rx_id = self.rx_id.wrapping_add(1);
            match decode_frame(&buf, DEFAULT_RX_CAPACITY) {
                Ok(frame) => {
                    self.stats().frames_received += 1;
                    if self.config.echo {
                        self.queue_frame(frame.clone());
                    }
                    let _ = self.frames.send(frame);
                }
                Err(err) => {
                    self.stats().rx_errors += 1;
                    warn!(error = %err, "emulator could not decode transfer");
                }
            }
        }
        if let Some(len) = self.rx_pending.pop_front() {
            self.rx_transfer = Some((vec![0; usize::from(len) * 4], 0));
        }
        Ok(())
    }

    fn queue_frame(&mut self, frame: Frame) {
        self.tx_queue.push_back(frame);
        if self.tx_phase == TxPhase::Idle {
            self.tx_phase = TxPhase::WaitReady;
            self.host_ready = false;
            self.channel.set_local_wake(true);
        }
    }

    fn start_next(&mut self) -> Result<()> {
        let Some(frame) = self.tx_queue.pop_front() else {
            return Ok(());
        };
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf)?;
        buf.resize(buf.len().div_ceil(4) * 4, 0);

        self.tx_phase = TxPhase::Sending;
        let words = (buf.len() / 4) as u16;
        self.tx_current = Some(buf);
        self.send_control(ControlWord::StartTrans {
            len: words,
            msg_id: self.tx_id,
        })
    }

    fn on_control_sent(&mut self) -> Result<()> {
        match self.controls.pop_front() {
            Some(ControlWord::StartTrans { .. }) => {
                if let Some(bytes) = self.tx_current.take() {
                    self.writes.push_back(true);
                    self.channel.write(&bytes)?;
                }
                Ok(())
            }
            Some(ControlWord::SwBreak) => {
                self.channel.set_local_wake(false);
                self.tx_phase = TxPhase::Idle;
                self.host_ready = false;
                if !self.tx_queue.is_empty() {
                    self.tx_phase = TxPhase::WaitReady;
                    self.channel.set_local_wake(true);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_write_sent(&mut self) -> Result<()> {
        match self.writes.pop_front() {
            Some(true) => {
                self.stats().frames_sent += 1;
                self.tx_id = self.tx_id.wrapping_add(1);
                if !self.tx_queue.is_empty() && self.host_ready {
                    self.start_next()
                } else {
                    self.tx_phase = TxPhase::Breaking;
                    self.send_control(ControlWord::SwBreak)
                }
            }
            _ => Ok(()),
        }
    }
}
