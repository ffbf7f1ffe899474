//! Negotiation handshake.
//!
//! The session always initiates:
//!
//! ```text
//! init speed, RTS on ──▶ NEGOTIATION req ──▶ response (ACK) ──▶ RTS off,
//! speed switch, wait CTS ──▶ ALIVE req ──▶ ALIVE resp ──▶ Active
//! ```
//!
//! Each wait is bounded by a timer; any failure resets the session and
//! reports `HandshakeFailed`. One call is one attempt.

use std::time::Duration;

use mcsaab_channel::LinkChannel;
use mcsaab_frame::{AlivePacket, Frame, NegotiationRequest, NegotiationResponse, NEG_NAK};
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, LinkError, Result};
use crate::event::{Notification, PeerInfo};
use crate::session::LinkSession;
use crate::state::{HandshakeStep, MainState, RecvState, SendState};
use crate::timer::{TimerKind, Timers};

impl<C: LinkChannel, T: Timers> LinkSession<C, T> {
    /// Start one negotiation attempt.
    ///
    /// Any existing session state is discarded first; an active link reports
    /// `LinkDown` with [`ErrorKind::NotActive`] before the attempt starts. The
    /// outcome arrives as `LinkUp` or `HandshakeFailed`.
    pub fn start_handshake(&mut self) {
        let was = self.main_state;
        if was != MainState::Init {
            debug!(state = %was, "discarding session for a new handshake");
            self.clear();
        }
        if was == MainState::Active {
            self.notify(Notification::LinkDown {
                kind: ErrorKind::NotActive,
                reason: "handshake restarted by owner".to_string(),
            });
        }
        if let Err(err) = self.begin_handshake() {
            self.fail(err);
        }
        self.update_keepalive();
    }

    pub(crate) fn begin_handshake(&mut self) -> Result<()> {
        self.main_state = MainState::Handshake;
        self.handshake_step = Some(HandshakeStep::Negotiate);
        self.stats.handshakes += 1;

        self.channel.set_speed(self.config.init_speed)?;
        self.channel.set_rts(true);
        self.rts = true;

        let request =
            NegotiationRequest::new(self.config.baud_divisor, self.config.mode, self.config.sysclk);
        debug!(
            baud_divisor = request.baud,
            mode = request.mode,
            sysclk = request.sysclk,
            speed = self.config.init_speed,
            "sending negotiation request"
        );
        self.write_link_frame(&request.into_frame())?;
        self.timers
            .arm(TimerKind::Handshake, self.config.handshake_timeout());
        Ok(())
    }

    pub(crate) fn on_negotiation_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.handshake_step != Some(HandshakeStep::Negotiate) {
            self.count_rx_error("negotiation frame outside the negotiation step dropped");
            return Ok(());
        }

        let response = NegotiationResponse::parse(&frame.payload)?;
        if !response.is_ack() {
            let verdict = if response.ack == NEG_NAK { "rejected" } else { "answered" };
            return Err(LinkError::ProtocolMismatch(format!(
                "negotiation {verdict} with ack {:#04x}",
                response.ack
            )));
        }
        self.timers.cancel(TimerKind::Handshake);

        debug!(
            man_id = response.man_id,
            ver_id = response.ver_id,
            "negotiation accepted"
        );
        self.peer = Some(PeerInfo {
            man_id: response.man_id,
            ver_id: response.ver_id,
            baud_divisor: response.baud,
            mode: response.mode,
            sysclk: response.sysclk,
            speed: self.config.speed,
        });

        self.channel.set_auto_flow(false);
        self.channel.set_rts(false);
        self.rts = false;
        self.channel.set_speed(self.config.speed)?;
        self.channel.set_auto_flow(true);

        self.handshake_step = Some(HandshakeStep::WaitCts);
        self.cts_waited = Duration::ZERO;
        if self.channel.cts() {
            self.send_alive()
        } else {
            self.timers.arm(TimerKind::CtsPoll, self.config.cts_poll());
            Ok(())
        }
    }

    pub(crate) fn on_cts_poll(&mut self) -> Result<()> {
        if self.handshake_step != Some(HandshakeStep::WaitCts) {
            return Ok(());
        }
        if self.channel.cts() {
            return self.send_alive();
        }

        self.cts_waited += self.config.cts_poll();
        if self.cts_waited >= self.config.cts_timeout() {
            return Err(LinkError::Timeout {
                what: HandshakeStep::WaitCts.as_str(),
                after: self.config.cts_timeout(),
            });
        }
        self.timers.arm(TimerKind::CtsPoll, self.config.cts_poll());
        Ok(())
    }

    fn send_alive(&mut self) -> Result<()> {
        self.timers.cancel(TimerKind::CtsPoll);
        self.handshake_step = Some(HandshakeStep::Alive);
        self.write_link_frame(&AlivePacket::request().into_frame())?;
        self.timers
            .arm(TimerKind::Handshake, self.config.handshake_timeout());
        Ok(())
    }

    pub(crate) fn on_alive_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.handshake_step != Some(HandshakeStep::Alive) {
            self.count_rx_error("alive frame outside the alive step dropped");
            return Ok(());
        }

        let alive = AlivePacket::parse(&frame.payload)?;
        if !alive.is_response() {
            return Err(LinkError::ProtocolMismatch(format!(
                "alive answered with {:#04x}",
                alive.mid
            )));
        }
        self.timers.cancel(TimerKind::Handshake);
        self.go_active()
    }

    fn go_active(&mut self) -> Result<()> {
        self.main_state = MainState::Active;
        self.handshake_step = None;
        self.send_state = SendState::Idle;
        self.recv_state = RecvState::Idle;

        if let Some(peer) = self.peer.clone() {
            info!(
                man_id = peer.man_id,
                ver_id = peer.ver_id,
                speed = peer.speed,
                "link up"
            );
            self.notify(Notification::LinkUp(peer));
        }

        // The peer may have raised its wake line while we were negotiating.
        if self.channel.peer_wake() {
            self.on_peer_wake(true)?;
        }
        Ok(())
    }

    pub(crate) fn on_handshake_timeout(&mut self) -> Result<()> {
        if self.main_state != MainState::Handshake {
            return Ok(());
        }
        let step = self.handshake_step.unwrap_or(HandshakeStep::Negotiate);
        Err(LinkError::Timeout {
            what: step.as_str(),
            after: self.config.handshake_timeout(),
        })
    }

    /// The peer sent a negotiation request on a running link: it rebooted.
    pub(crate) fn restart_for_peer(&mut self) -> Result<()> {
        warn!(
            tx_queue = self.tx_queue.len(),
            tx_id = self.tx_id,
            rx_id = self.rx_id,
            "peer restarted negotiation, restarting handshake"
        );
        self.clear();
        self.notify(Notification::PeerRestarted);
        self.begin_handshake()
    }
}
