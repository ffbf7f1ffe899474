//! The link session: one state machine per link.
//!
//! [`LinkSession`] never blocks and never spawns anything. Its owner feeds it
//! [`Event`]s (channel notifications and timer expiries) one at a time and
//! drains the resulting [`Notification`]s. The handshake, transmit and receive
//! halves live in their own modules as further `impl` blocks.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use mcsaab_channel::{ChannelEvent, LinkChannel};
use mcsaab_frame::{encode_frame, ControlWord, Frame, FrameDecoder};
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use crate::config::LinkConfig;
use crate::control::ControlQueue;
use crate::error::{ErrorKind, LinkError, Result};
use crate::event::{Event, Notification, PeerInfo};
use crate::state::{HandshakeStep, MainState, RecvState, SendState};
use crate::timer::{TimerKind, Timers};

/// Running counters. Survive resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Data frames whose transfer completed.
    pub frames_sent: u64,
    /// Data frames delivered upward.
    pub frames_received: u64,
    /// Undecodable input: unknown tags, oversized headers, bad transfers.
    pub rx_errors: u64,
    /// Headers that declared more payload than the receive buffer holds.
    pub oversized: u64,
    /// Control words dropped because the ring was full.
    pub control_dropped: u64,
    /// Full resets.
    pub resets: u64,
    /// Negotiation attempts.
    pub handshakes: u64,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub main_state: MainState,
    pub handshake_step: Option<HandshakeStep>,
    pub send_state: SendState,
    pub recv_state: RecvState,
    pub tx_id: u8,
    pub rx_id: u8,
    pub tx_queue: usize,
    pub pending_rx: usize,
    pub local_wake: bool,
    pub rts: bool,
    pub peer: Option<PeerInfo>,
    pub rx_garbage_bytes: usize,
    pub stats: LinkStats,
}

/// Which write a `WriteComplete` belongs to. Writes complete in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteKind {
    LinkControl,
    Transfer,
}

/// An announced inbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Announce {
    pub(crate) words: u16,
    pub(crate) msg_id: u8,
}

/// An inbound transfer being read.
#[derive(Debug)]
pub(crate) struct RxTransfer {
    pub(crate) msg_id: u8,
    pub(crate) buf: Vec<u8>,
    pub(crate) filled: usize,
}

/// State machine for one McSAAB / H4+ link.
pub struct LinkSession<C, T> {
    pub(crate) channel: C,
    pub(crate) timers: T,
    pub(crate) config: LinkConfig,

    pub(crate) main_state: MainState,
    pub(crate) handshake_step: Option<HandshakeStep>,
    pub(crate) send_state: SendState,
    pub(crate) recv_state: RecvState,
    pub(crate) tx_id: u8,
    pub(crate) rx_id: u8,

    pub(crate) tx_queue: VecDeque<Frame>,
    pub(crate) tx_current: Option<Bytes>,
    pub(crate) pending_rx: VecDeque<Announce>,
    pub(crate) rx_transfer: Option<RxTransfer>,
    /// Data bytes that arrived ahead of their START_TRANS.
    pub(crate) rx_early: BytesMut,
    pub(crate) control: ControlQueue,
    pub(crate) writes: VecDeque<WriteKind>,
    pub(crate) decoder: FrameDecoder,

    pub(crate) local_wake: bool,
    pub(crate) peer_awake: bool,
    pub(crate) rts: bool,
    pub(crate) rts_release_pending: bool,
    pub(crate) cts_waited: Duration,
    keepalive_armed: bool,

    pub(crate) peer: Option<PeerInfo>,
    last_control_tx: Option<u32>,
    pub(crate) last_control_rx: Option<u32>,
    pub(crate) stats: LinkStats,
    /// Bumped by every reset; lets loops notice that state was discarded
    /// underneath them.
    pub(crate) generation: u64,
    outbox: VecDeque<Notification>,
}

impl<C: LinkChannel, T: Timers> LinkSession<C, T> {
    /// Create a session in [`MainState::Init`].
    ///
    /// The caller installs the channel notifier; the session only calls the
    /// channel.
    pub fn new(channel: C, timers: T, config: LinkConfig) -> Self {
        let decoder = FrameDecoder::with_config(&config.frame_config());
        Self {
            channel,
            timers,
            config,
            main_state: MainState::Init,
            handshake_step: None,
            send_state: SendState::Idle,
            recv_state: RecvState::Idle,
            tx_id: 0,
            rx_id: 0,
            tx_queue: VecDeque::new(),
            tx_current: None,
            pending_rx: VecDeque::new(),
            rx_transfer: None,
            rx_early: BytesMut::new(),
            control: ControlQueue::new(),
            writes: VecDeque::new(),
            decoder,
            local_wake: false,
            peer_awake: false,
            rts: false,
            rts_release_pending: false,
            cts_waited: Duration::ZERO,
            keepalive_armed: false,
            peer: None,
            last_control_tx: None,
            last_control_rx: None,
            stats: LinkStats::default(),
            generation: 0,
            outbox: VecDeque::new(),
        }
    }

    /// Process one event.
    ///
    /// Fatal errors take the reset path here and surface as notifications.
    pub fn handle(&mut self, event: impl Into<Event>) {
        let event = event.into();
        trace!(?event, state = %self.main_state, "link event");
        if let Err(err) = self.dispatch(event) {
            self.fail(err);
        }
        self.update_keepalive();
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Channel(ChannelEvent::DataReady) => {
                self.pump_rx()?;
                self.recheck_rts();
                Ok(())
            }
            Event::Channel(ChannelEvent::WriteComplete) => self.on_write_complete(),
            Event::Channel(ChannelEvent::Control(word)) => self.on_control(word),
            Event::Channel(ChannelEvent::ControlWriteComplete) => self.on_control_complete(),
            Event::Channel(ChannelEvent::PeerWake(on)) => self.on_peer_wake(on),
            Event::Channel(ChannelEvent::TxEmpty) => self.on_tx_empty(),
            Event::Channel(ChannelEvent::PeerReset) => Err(LinkError::PeerReset),
            Event::Channel(ChannelEvent::Fault(reason)) => Err(LinkError::Fault(reason)),
            Event::Timer(kind) => self.on_timer(kind),
        }
    }

    fn on_timer(&mut self, kind: TimerKind) -> Result<()> {
        self.timers.cancel(kind);
        match kind {
            TimerKind::Handshake => self.on_handshake_timeout(),
            TimerKind::CtsPoll => self.on_cts_poll(),
            TimerKind::Tx => self.on_tx_timeout(),
            TimerKind::Rx => self.on_rx_timeout(),
            TimerKind::KeepAlive => {
                self.keepalive_armed = false;
                trace!(
                    send_state = %self.send_state,
                    recv_state = %self.recv_state,
                    "keep-alive probe"
                );
                Ok(())
            }
        }
    }

    /// Tear the link down without an error.
    ///
    /// Takes the same path as a fatal error, minus the diagnostic dump. A
    /// pending handshake reports `HandshakeFailed` and an active link
    /// `LinkDown`, both with [`ErrorKind::NotActive`].
    pub fn reset(&mut self) {
        debug!(state = %self.main_state, "link reset by owner");
        let was = self.main_state;
        self.clear();
        let reason = "reset by owner".to_string();
        match was {
            MainState::Handshake => self.notify(Notification::HandshakeFailed {
                kind: ErrorKind::NotActive,
                reason,
            }),
            MainState::Active => self.notify(Notification::LinkDown {
                kind: ErrorKind::NotActive,
                reason,
            }),
            MainState::Init => {}
        }
    }

    /// The fatal error path: dump diagnostics, reset, notify.
    pub(crate) fn fail(&mut self, err: LinkError) {
        let kind = err.kind();
        error!(
            error = %err,
            %kind,
            main_state = %self.main_state,
            handshake_step = ?self.handshake_step,
            send_state = %self.send_state,
            recv_state = %self.recv_state,
            tx_id = self.tx_id,
            rx_id = self.rx_id,
            tx_queue = self.tx_queue.len(),
            pending_rx = self.pending_rx.len(),
            control_queue = self.control.len(),
            last_control_tx = ?self.last_control_tx.map(ControlWord::from_u32),
            last_control_rx = ?self.last_control_rx.map(ControlWord::from_u32),
            frames_sent = self.stats.frames_sent,
            frames_received = self.stats.frames_received,
            rx_errors = self.stats.rx_errors,
            rx_garbage = self.decoder.garbage_bytes(),
            "link reset"
        );

        let was = self.main_state;
        self.clear();
        self.stats.resets += 1;

        let reason = err.to_string();
        match was {
            MainState::Handshake => self.notify(Notification::HandshakeFailed { kind, reason }),
            MainState::Active => self.notify(Notification::LinkDown { kind, reason }),
            MainState::Init => {}
        }
    }

    /// Back to `Init` with every queue, buffer, counter and timer cleared.
    pub(crate) fn clear(&mut self) {
        self.main_state = MainState::Init;
        self.handshake_step = None;
        self.send_state = SendState::Idle;
        self.recv_state = RecvState::Idle;
        self.tx_id = 0;
        self.rx_id = 0;

        self.tx_queue.clear();
        self.tx_current = None;
        self.pending_rx.clear();
        self.rx_transfer = None;
        self.rx_early.clear();
        self.control.clear();
        self.writes.clear();
        self.decoder.reset();

        self.channel.cancel_io();
        self.channel.set_local_wake(false);
        self.channel.set_rts(false);
        self.local_wake = false;
        self.rts = false;
        self.rts_release_pending = false;
        self.cts_waited = Duration::ZERO;

        self.timers.cancel_all();
        self.keepalive_armed = false;
        self.peer = None;
        self.generation += 1;
    }

    /// Arm the keep-alive timer while work is pending, cancel it once idle.
    pub(crate) fn update_keepalive(&mut self) {
        let pending = self.main_state == MainState::Handshake
            || !self.tx_queue.is_empty()
            || self.tx_current.is_some()
            || self.send_state.is_busy()
            || self.rx_transfer.is_some()
            || !self.pending_rx.is_empty()
            || !self.control.is_empty();

        if pending && !self.keepalive_armed {
            self.timers.arm(TimerKind::KeepAlive, self.config.keepalive());
            self.keepalive_armed = true;
        } else if !pending && self.keepalive_armed {
            self.timers.cancel(TimerKind::KeepAlive);
            self.keepalive_armed = false;
        }
    }

    /// Queue a control word; sends it now if the control sub-channel is idle.
    ///
    /// A full ring drops the word without failing the link.
    pub(crate) fn send_control(&mut self, word: ControlWord) -> Result<()> {
        match self.control.push(word.to_u32()) {
            Ok(Some(raw)) => self.write_control(raw),
            Ok(None) => Ok(()),
            Err(_) => {
                self.stats.control_dropped += 1;
                Ok(())
            }
        }
    }

    fn write_control(&mut self, raw: u32) -> Result<()> {
        self.last_control_tx = Some(raw);
        trace!(word = format_args!("{raw:#010x}"), "control word out");
        self.channel.write_control(raw)?;
        Ok(())
    }

    pub(crate) fn on_control_complete(&mut self) -> Result<()> {
        let (done, next) = self.control.complete();
        if let Some(raw) = next {
            self.write_control(raw)?;
        }
        match done.map(ControlWord::from_u32) {
            Some(Ok(ControlWord::StartTrans { .. })) => self.write_transfer(),
            Some(Ok(ControlWord::SwBreak)) => self.on_break_sent(),
            Some(_) => Ok(()),
            None => {
                debug!("control completion with nothing in flight");
                Ok(())
            }
        }
    }

    /// Write a negotiation or alive frame straight onto the data stream.
    pub(crate) fn write_link_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut buf = BytesMut::with_capacity(frame.wire_size());
        encode_frame(frame, &mut buf)?;
        self.channel.write(&buf)?;
        self.writes.push_back(WriteKind::LinkControl);
        Ok(())
    }

    pub(crate) fn on_write_complete(&mut self) -> Result<()> {
        match self.writes.pop_front() {
            Some(WriteKind::Transfer) => self.on_transfer_sent(),
            Some(WriteKind::LinkControl) => Ok(()),
            None => {
                debug!("write completion with nothing in flight");
                Ok(())
            }
        }
    }

    pub(crate) fn set_local_wake(&mut self, on: bool) {
        if self.local_wake != on {
            trace!(on, "local wake");
            self.channel.set_local_wake(on);
            self.local_wake = on;
        }
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.outbox.push_back(notification);
    }

    /// Next pending notification.
    pub fn poll_notification(&mut self) -> Option<Notification> {
        self.outbox.pop_front()
    }

    /// Take every pending notification.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.outbox.drain(..).collect()
    }

    pub fn main_state(&self) -> MainState {
        self.main_state
    }

    pub fn handshake_step(&self) -> Option<HandshakeStep> {
        self.handshake_step
    }

    pub fn send_state(&self) -> SendState {
        self.send_state
    }

    pub fn recv_state(&self) -> RecvState {
        self.recv_state
    }

    /// Id of the next outbound transfer.
    pub fn tx_id(&self) -> u8 {
        self.tx_id
    }

    /// Id expected on the next inbound transfer.
    pub fn rx_id(&self) -> u8 {
        self.rx_id
    }

    pub fn tx_queue_len(&self) -> usize {
        self.tx_queue.len()
    }

    pub fn pending_rx_len(&self) -> usize {
        self.pending_rx.len()
    }

    pub fn control_queue_len(&self) -> usize {
        self.control.len()
    }

    pub fn local_wake(&self) -> bool {
        self.local_wake
    }

    /// Whether inbound RTS is asserted.
    pub fn rts(&self) -> bool {
        self.rts
    }

    /// Bytes the stream decoder still has to skip.
    pub fn rx_garbage_bytes(&self) -> usize {
        self.decoder.garbage_bytes()
    }

    /// Peer details from the last successful negotiation.
    pub fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            main_state: self.main_state,
            handshake_step: self.handshake_step,
            send_state: self.send_state,
            recv_state: self.recv_state,
            tx_id: self.tx_id,
            rx_id: self.rx_id,
            tx_queue: self.tx_queue.len(),
            pending_rx: self.pending_rx.len(),
            local_wake: self.local_wake,
            rts: self.rts,
            peer: self.peer.clone(),
            rx_garbage_bytes: self.decoder.garbage_bytes(),
            stats: self.stats,
        }
    }

    pub(crate) fn count_rx_error(&mut self, what: &str) {
        self.stats.rx_errors += 1;
        warn!(state = %self.main_state, rx_errors = self.stats.rx_errors, "{what}");
    }
}

impl<C, T> fmt::Debug for LinkSession<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSession")
            .field("main_state", &self.main_state)
            .field("handshake_step", &self.handshake_step)
            .field("send_state", &self.send_state)
            .field("recv_state", &self.recv_state)
            .field("tx_id", &self.tx_id)
            .field("rx_id", &self.rx_id)
            .field("tx_queue", &self.tx_queue.len())
            .field("pending_rx", &self.pending_rx.len())
            .finish_non_exhaustive()
    }
}
