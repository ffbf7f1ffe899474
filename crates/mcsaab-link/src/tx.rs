//! Transmit half.
//!
//! One frame per transfer:
//!
//! ```text
//! Idle ─wake─▶ WaitReady ─READY─▶ Sending ─START_TRANS, bytes─▶ (next frame)
//!                                    │
//!                            queue empty ▼
//!                    Draining ─tx empty─▶ SendingControl ─SW_BREAK─▶ Idle
//! ```
//!
//! Frames queued while a transfer is in flight follow back to back without
//! another READY.

use bytes::BytesMut;
use mcsaab_channel::LinkChannel;
use mcsaab_frame::{encode_frame, ControlWord, Frame, FrameError};
use tracing::{debug, trace, warn};

use crate::error::{LinkError, Result};
use crate::session::{LinkSession, WriteKind};
use crate::state::{MainState, SendState};
use crate::timer::{TimerKind, Timers};

impl<C: LinkChannel, T: Timers> LinkSession<C, T> {
    /// Queue a data frame for the peer.
    ///
    /// Fails without touching the session when the link is down, the frame
    /// is a link-control frame, it does not fit one transfer, or the queue is
    /// full.
    pub fn enqueue(&mut self, frame: Frame) -> Result<()> {
        if self.main_state != MainState::Active {
            return Err(LinkError::NotActive);
        }
        if frame.packet_type.is_link_control() {
            return Err(FrameError::InvalidPayload {
                what: "frame",
                reason: format!("{} frames are reserved for the link", frame.packet_type),
            }
            .into());
        }
        let size = frame.wire_size();
        if size > self.config.max_transfer_bytes() {
            return Err(FrameError::FrameTooLarge {
                declared: size,
                capacity: self.config.max_transfer_bytes(),
            }
            .into());
        }
        if self.tx_queue.len() >= self.config.tx_queue_len {
            warn!(
                capacity = self.config.tx_queue_len,
                packet_type = %frame.packet_type,
                "transmit queue full, frame dropped"
            );
            return Err(LinkError::QueueFull {
                queue: "tx",
                capacity: self.config.tx_queue_len,
            });
        }

        trace!(packet_type = %frame.packet_type, size, "frame queued");
        self.tx_queue.push_back(frame);
        if let Err(err) = self.kick_tx() {
            self.fail(err);
        }
        self.update_keepalive();
        Ok(())
    }

    fn kick_tx(&mut self) -> Result<()> {
        match self.send_state {
            SendState::Idle => {
                self.announce_wake();
                Ok(())
            }
            SendState::Ready => self.start_next_transfer(),
            _ => Ok(()),
        }
    }

    /// Raise the wake line and wait for the peer's READY.
    fn announce_wake(&mut self) {
        self.set_local_wake(true);
        self.send_state = SendState::WaitReady;
        self.timers.arm(TimerKind::Tx, self.config.tx_timeout());
    }

    fn start_next_transfer(&mut self) -> Result<()> {
        let Some(frame) = self.tx_queue.pop_front() else {
            return Ok(());
        };
        self.set_local_wake(true);

        let mut buf = BytesMut::with_capacity(frame.wire_size() + 3);
        encode_frame(&frame, &mut buf)?;
        buf.resize(buf.len().div_ceil(4) * 4, 0);
        let words = u16::try_from(buf.len() / 4).map_err(|_| FrameError::FrameTooLarge {
            declared: buf.len(),
            capacity: self.config.max_transfer_bytes(),
        })?;

        debug!(
            msg_id = self.tx_id,
            words,
            packet_type = %frame.packet_type,
            queued = self.tx_queue.len(),
            "starting transfer"
        );
        self.tx_current = Some(buf.freeze());
        self.send_state = SendState::Sending;
        self.timers.arm(TimerKind::Tx, self.config.tx_timeout());
        self.send_control(ControlWord::StartTrans {
            len: words,
            msg_id: self.tx_id,
        })
    }

    /// START_TRANS went out; the transfer bytes follow.
    pub(crate) fn write_transfer(&mut self) -> Result<()> {
        if self.send_state != SendState::Sending {
            return Ok(());
        }
        if let Some(bytes) = self.tx_current.clone() {
            self.channel.write(&bytes)?;
            self.writes.push_back(WriteKind::Transfer);
        }
        Ok(())
    }

    pub(crate) fn on_transfer_sent(&mut self) -> Result<()> {
        if self.tx_current.take().is_none() {
            return Ok(());
        }
        self.stats.frames_sent += 1;
        self.tx_id = self.tx_id.wrapping_add(1);

        if !self.tx_queue.is_empty() {
            return self.start_next_transfer();
        }
        if self.channel.tx_empty() {
            self.send_break()
        } else {
            self.send_state = SendState::Draining;
            self.timers.arm(TimerKind::Tx, self.config.tx_timeout());
            Ok(())
        }
    }

    pub(crate) fn on_tx_empty(&mut self) -> Result<()> {
        if self.send_state == SendState::Draining {
            self.send_break()?;
        }
        self.recheck_rts();
        Ok(())
    }

    fn send_break(&mut self) -> Result<()> {
        self.send_state = SendState::SendingControl;
        self.timers.arm(TimerKind::Tx, self.config.tx_timeout());
        self.send_control(ControlWord::SwBreak)
    }

    /// SW_BREAK went out: the burst is over.
    pub(crate) fn on_break_sent(&mut self) -> Result<()> {
        if self.send_state != SendState::SendingControl {
            return Ok(());
        }
        if self.tx_queue.is_empty() {
            self.set_local_wake(false);
            self.send_state = SendState::Idle;
            self.timers.cancel(TimerKind::Tx);
            return Ok(());
        }

        // Frames raced in behind the break: start a new burst.
        debug!(queued = self.tx_queue.len(), "frames queued during break, re-announcing");
        self.set_local_wake(false);
        self.announce_wake();
        Ok(())
    }

    pub(crate) fn on_peer_ready(&mut self) -> Result<()> {
        match self.send_state {
            SendState::WaitReady if self.tx_queue.is_empty() => {
                self.send_state = SendState::Ready;
                self.timers.cancel(TimerKind::Tx);
                Ok(())
            }
            SendState::WaitReady => self.start_next_transfer(),
            SendState::Idle => {
                self.send_state = SendState::Ready;
                Ok(())
            }
            state => {
                trace!(%state, "READY ignored");
                Ok(())
            }
        }
    }

    pub(crate) fn on_tx_timeout(&mut self) -> Result<()> {
        if !self.send_state.is_busy() {
            return Ok(());
        }
        Err(LinkError::Timeout {
            what: "transmit",
            after: self.config.tx_timeout(),
        })
    }
}
