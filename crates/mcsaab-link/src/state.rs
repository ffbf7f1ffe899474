//! Session state enums.

use std::fmt;

use serde::Serialize;

/// Top-level link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MainState {
    /// Not negotiated.
    Init,
    /// Negotiation request sent; waiting for the handshake to finish.
    Handshake,
    /// Negotiated and alive; frames flow.
    Active,
}

/// Step inside [`MainState::Handshake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStep {
    /// Waiting for the negotiation response.
    Negotiate,
    /// Speed switched; polling CTS.
    WaitCts,
    /// Waiting for the alive response.
    Alive,
}

/// Transmit engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    Idle,
    /// Local wake raised; waiting for the peer's READY.
    WaitReady,
    /// Peer is ready; the next frame starts immediately.
    Ready,
    /// A transfer is announced or its bytes are in flight.
    Sending,
    /// SW_BREAK in flight.
    SendingControl,
    /// Waiting for the transmit holding register to empty.
    Draining,
}

/// Receive engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecvState {
    Idle,
    /// READY sent; waiting for a transfer.
    Ready,
    /// Reading an announced transfer.
    Receiving,
}

impl MainState {
    pub fn as_str(self) -> &'static str {
        match self {
            MainState::Init => "init",
            MainState::Handshake => "handshake",
            MainState::Active => "active",
        }
    }
}

impl HandshakeStep {
    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeStep::Negotiate => "negotiation response",
            HandshakeStep::WaitCts => "cts",
            HandshakeStep::Alive => "alive response",
        }
    }
}

impl SendState {
    pub fn as_str(self) -> &'static str {
        match self {
            SendState::Idle => "idle",
            SendState::WaitReady => "wait_ready",
            SendState::Ready => "ready",
            SendState::Sending => "sending",
            SendState::SendingControl => "sending_control",
            SendState::Draining => "draining",
        }
    }

    /// States guarded by the transmit watchdog.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SendState::WaitReady
                | SendState::Sending
                | SendState::SendingControl
                | SendState::Draining
        )
    }
}

impl RecvState {
    pub fn as_str(self) -> &'static str {
        match self {
            RecvState::Idle => "idle",
            RecvState::Ready => "ready",
            RecvState::Receiving => "receiving",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(MainState, HandshakeStep, SendState, RecvState);
