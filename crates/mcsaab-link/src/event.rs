use mcsaab_channel::ChannelEvent;
use mcsaab_frame::Frame;
use serde::Serialize;

use crate::error::ErrorKind;
use crate::timer::TimerKind;

/// Input to [`LinkSession::handle`](crate::session::LinkSession::handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Something happened on the channel.
    Channel(ChannelEvent),
    /// A timer expired.
    Timer(TimerKind),
}

impl From<ChannelEvent> for Event {
    fn from(event: ChannelEvent) -> Self {
        Event::Channel(event)
    }
}

impl From<TimerKind> for Event {
    fn from(kind: TimerKind) -> Self {
        Event::Timer(kind)
    }
}

/// What the peer reported during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    /// Manufacturer id.
    pub man_id: u8,
    /// Version id.
    pub ver_id: u8,
    /// Baud divisor the peer accepted.
    pub baud_divisor: u16,
    /// Protocol mode the peer accepted.
    pub mode: u8,
    /// System clock parameter the peer accepted.
    pub sysclk: u16,
    /// Line speed in use after the switch.
    pub speed: u32,
}

/// Output of the session, drained by its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Negotiation and alive check succeeded.
    LinkUp(PeerInfo),
    /// An active link hit a fatal error and was reset.
    LinkDown { kind: ErrorKind, reason: String },
    /// Negotiation failed and the session was reset.
    HandshakeFailed { kind: ErrorKind, reason: String },
    /// The peer started a new negotiation while the link was up; queued
    /// frames were dropped and the handshake restarted.
    PeerRestarted,
    /// A frame arrived from the peer.
    Frame(Frame),
}
