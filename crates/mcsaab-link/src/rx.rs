//! Receive half.
//!
//! Data frames only arrive inside transfers the peer announced with
//! START_TRANS. Between transfers the data stream carries nothing but
//! negotiation and alive frames, which go through the stream decoder.

use bytes::Buf;
use mcsaab_channel::LinkChannel;
use mcsaab_frame::{decode_frame, AlivePacket, ControlWord, Frame, FrameError, PacketType, NEG_REQ};
use tracing::{debug, trace};

use crate::error::{LinkError, Result};
use crate::event::Notification;
use crate::session::{Announce, LinkSession, RxTransfer};
use crate::state::{MainState, RecvState};
use crate::timer::{TimerKind, Timers};

const RX_CHUNK: usize = 256;

impl<C: LinkChannel, T: Timers> LinkSession<C, T> {
    pub(crate) fn on_control(&mut self, raw: u32) -> Result<()> {
        self.last_control_rx = Some(raw);
        let word = match ControlWord::from_u32(raw) {
            Ok(word) => word,
            Err(err) => {
                self.count_rx_error(&format!("control word dropped: {err}"));
                return Ok(());
            }
        };
        trace!(%word, "control word in");

        match word {
            ControlWord::Ready if self.main_state == MainState::Active => self.on_peer_ready(),
            ControlWord::StartTrans { len, msg_id } => self.on_start_trans(Announce {
                words: len,
                msg_id,
            }),
            ControlWord::BootInfoReq(version) | ControlWord::BootInfoResp(version) => {
                debug!(%word, version, "boot info ignored on a running link");
                Ok(())
            }
            ControlWord::Ready | ControlWord::SwBreak | ControlWord::Dummy => Ok(()),
        }
    }

    fn on_start_trans(&mut self, announce: Announce) -> Result<()> {
        if self.main_state != MainState::Active {
            self.count_rx_error("transfer announced on an inactive link");
            return Ok(());
        }
        if self.rx_transfer.is_some() {
            self.pending_rx.push_back(announce);
            return Ok(());
        }
        self.start_transfer(announce)?;
        self.pump_rx()
    }

    fn start_transfer(&mut self, announce: Announce) -> Result<()> {
        if announce.msg_id != self.rx_id {
            return Err(LinkError::ProtocolMismatch(format!(
                "transfer id {} out of sequence, expected {}",
                announce.msg_id, self.rx_id
            )));
        }
        if announce.words > self.config.max_transfer_words {
            return Err(LinkError::ProtocolMismatch(format!(
                "transfer of {} words exceeds the {} word limit",
                announce.words, self.config.max_transfer_words
            )));
        }

        trace!(msg_id = announce.msg_id, words = announce.words, "transfer announced");
        self.rx_transfer = Some(RxTransfer {
            msg_id: announce.msg_id,
            buf: vec![0; usize::from(announce.words) * 4],
            filled: 0,
        });
        self.recv_state = RecvState::Receiving;
        self.timers.arm(TimerKind::Rx, self.config.rx_timeout());

        if announce.words == 0 {
            return self.finish_transfer();
        }
        Ok(())
    }

    /// Read everything the channel holds.
    ///
    /// Bytes fill the current transfer first. Without one, an active link
    /// holds data bytes back for the next announced transfer and only runs
    /// link-control frames and oversized headers through the stream decoder.
    /// Stops early if a reset discarded the session.
    pub(crate) fn pump_rx(&mut self) -> Result<()> {
        let generation = self.generation;
        loop {
            if self.rx_transfer.is_some() && self.decoder.garbage_bytes() > 0 {
                // Excess of an oversized stream frame comes before transfer data.
                if self.rx_early.is_empty() && !self.stash_chunk()? {
                    return Ok(());
                }
                self.skip_early_garbage();
                continue;
            }
            if let Some(transfer) = self.rx_transfer.as_mut() {
                let dst = &mut transfer.buf[transfer.filled..];
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
                transfer.filled += n;
                if transfer.filled == transfer.buf.len() {
                    self.finish_transfer()?;
                }
            } else {
                let mut chunk = [0u8; RX_CHUNK];
                let n = self.channel.read_into(&mut chunk)?;
                match self.main_state {
                    MainState::Init => {
                        if n == 0 {
                            return Ok(());
                        }
                        trace!(len = n, "input discarded before negotiation");
                    }
                    MainState::Handshake => {
                        if n == 0 || self.decode_stream(&chunk[..n], generation)? {
                            return Ok(());
                        }
                    }
                    MainState::Active => {
                        self.rx_early.extend_from_slice(&chunk[..n]);
                        if self.drain_early(generation)? || n == 0 {
                            return Ok(());
                        }
                        if self.rx_early.len() > 2 * self.config.max_transfer_bytes() {
                            let dropped = self.rx_early.len();
                            self.rx_early.clear();
                            self.count_rx_error(&format!(
                                "{dropped} unannounced bytes dropped"
                            ));
                        }
                    }
                }
            }
            if self.generation != generation {
                return Ok(());
            }
        }
    }

    /// Move one channel read into the held bytes. False when nothing came.
    fn stash_chunk(&mut self) -> Result<bool> {
        let mut chunk = [0u8; RX_CHUNK];
        let n = self.channel.read_into(&mut chunk)?;
        self.rx_early.extend_from_slice(&chunk[..n]);
        Ok(n > 0)
    }

    /// Drop pending decoder garbage from the front of the held bytes.
    fn skip_early_garbage(&mut self) -> usize {
        let skipped = self.decoder.consume_garbage(self.rx_early.len());
        self.rx_early.advance(skipped);
        skipped
    }

    /// Work through the held bytes between transfers.
    ///
    /// Pending garbage is skipped, then the stream decoder takes whatever
    /// [`early_needs_decoder`](Self::early_needs_decoder) claims. Data frames
    /// that fit stay put for their announcement. Returns true if a reset
    /// discarded the session on the way.
    fn drain_early(&mut self, generation: u64) -> Result<bool> {
        loop {
            if self.decoder.garbage_bytes() > 0 {
                if self.skip_early_garbage() == 0 {
                    return Ok(false);
                }
                continue;
            }
            if !self.early_needs_decoder() {
                return Ok(false);
            }
            match self.decoder.decode(&mut self.rx_early) {
                Ok(Some(frame)) => self.on_stream_frame(frame)?,
                Ok(None) => return Ok(false),
                Err(err) => self.on_stream_error(&err),
            }
            if self.generation != generation {
                return Ok(true);
            }
        }
    }

    /// True when the held bytes belong to the stream decoder rather than
    /// the next transfer: a frame the decoder already started, an unknown
    /// or link-control tag, or a data header declaring more than the
    /// receive buffer holds.
    fn early_needs_decoder(&self) -> bool {
        if !self.decoder.is_idle() {
            return true;
        }
        let Some((&tag, header)) = self.rx_early.split_first() else {
            return false;
        };
        match PacketType::from_u8(tag) {
            Some(packet_type) if !packet_type.is_link_control() => packet_type
                .layout()
                .payload_len(header)
                .is_some_and(|declared| declared > self.decoder.capacity()),
            _ => true,
        }
    }

    /// Run bytes through the stream decoder. Returns true if a reset
    /// discarded the session on the way.
    fn decode_stream(&mut self, bytes: &[u8], generation: u64) -> Result<bool> {
        for result in self.decoder.feed(bytes) {
            match result {
                Ok(frame) => self.on_stream_frame(frame)?,
                Err(err) => self.on_stream_error(&err),
            }
            if self.generation != generation {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn on_stream_frame(&mut self, frame: Frame) -> Result<()> {
        match (self.main_state, frame.packet_type) {
            (MainState::Handshake, PacketType::Negotiation) => self.on_negotiation_frame(&frame),
            (MainState::Handshake, PacketType::Alive) => self.on_alive_frame(&frame),
            (MainState::Active, PacketType::Negotiation)
                if frame.payload.first() == Some(&NEG_REQ) =>
            {
                self.restart_for_peer()
            }
            (MainState::Active, PacketType::Alive)
                if AlivePacket::parse(&frame.payload).is_ok_and(|alive| alive.is_request()) =>
            {
                debug!("answering alive request");
                self.write_link_frame(&AlivePacket::response().into_frame())
            }
            (state, packet_type) => {
                self.count_rx_error(&format!("unannounced {packet_type} frame dropped in {state}"));
                Ok(())
            }
        }
    }

    fn on_stream_error(&mut self, err: &FrameError) {
        self.stats.rx_errors += 1;
        if matches!(err, FrameError::FrameTooLarge { .. }) {
            self.stats.oversized += 1;
        }
        debug!(
            error = %err,
            garbage = self.decoder.garbage_bytes(),
            "stream input dropped"
        );
    }

    fn finish_transfer(&mut self) -> Result<()> {
        let Some(transfer) = self.rx_transfer.take() else {
            return Ok(());
        };
        self.timers.cancel(TimerKind::Rx);
        self.rx_id = self.rx_id.wrapping_add(1);

        match decode_frame(&transfer.buf, self.config.rx_capacity) {
            Ok(frame) if !frame.packet_type.is_link_control() => {
                trace!(
                    msg_id = transfer.msg_id,
                    packet_type = %frame.packet_type,
                    len = frame.payload.len(),
                    "frame received"
                );
                self.stats.frames_received += 1;
                self.notify(Notification::Frame(frame));
            }
            Ok(frame) => self.count_rx_error(&format!(
                "{} frame inside transfer {} dropped",
                frame.packet_type, transfer.msg_id
            )),
            Err(err) => {
                self.count_rx_error(&format!("transfer {} undecodable: {err}", transfer.msg_id))
            }
        }

        if let Some(next) = self.pending_rx.pop_front() {
            return self.start_transfer(next);
        }
        if self.peer_awake {
            self.recv_state = RecvState::Ready;
            self.timers.arm(TimerKind::Rx, self.config.rx_timeout());
        } else {
            self.recv_state = RecvState::Idle;
            self.try_release_rts();
        }
        Ok(())
    }

    pub(crate) fn on_peer_wake(&mut self, on: bool) -> Result<()> {
        self.peer_awake = on;
        if self.main_state != MainState::Active {
            trace!(on, state = %self.main_state, "peer wake before link up");
            return Ok(());
        }

        if on {
            if self.recv_state == RecvState::Idle {
                self.rts_release_pending = false;
                self.channel.set_rts(true);
                self.rts = true;
                self.recv_state = RecvState::Ready;
                self.timers.arm(TimerKind::Rx, self.config.rx_timeout());
                self.send_control(ControlWord::Ready)?;
            }
        } else if self.rx_transfer.is_none() && self.pending_rx.is_empty() {
            self.recv_state = RecvState::Idle;
            self.timers.cancel(TimerKind::Rx);
            self.try_release_rts();
        }
        Ok(())
    }

    /// Drop RTS once nothing is left in flight either way.
    fn try_release_rts(&mut self) {
        if self.channel.tx_empty() && !self.channel.data_ready() {
            self.channel.set_rts(false);
            self.rts = false;
            self.rts_release_pending = false;
        } else {
            self.rts_release_pending = true;
        }
    }

    pub(crate) fn recheck_rts(&mut self) {
        if self.rts_release_pending
            && self.main_state == MainState::Active
            && self.recv_state == RecvState::Idle
        {
            self.try_release_rts();
        }
    }

    pub(crate) fn on_rx_timeout(&mut self) -> Result<()> {
        if self.recv_state == RecvState::Idle {
            return Ok(());
        }
        Err(LinkError::Timeout {
            what: "receive",
            after: self.config.rx_timeout(),
        })
    }
}

#[cfg(test)]
mod tests {
    use mcsaab_channel::ChannelEvent;

    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{
        active_session, announce, assert_fully_reset, deliver, feed, transfer_bytes, wire,
        TestSession,
    };

    fn wake(session: &mut TestSession, on: bool) {
        session.channel_mut().peer_wake = on;
        session.handle(ChannelEvent::PeerWake(on));
    }

    fn frames(session: &mut TestSession) -> Vec<Frame> {
        session
            .drain_notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Frame(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn scenario_receive_one_frame() {
        let mut session = active_session();
        wake(&mut session, true);
        assert!(session.rts());
        assert_eq!(session.recv_state(), RecvState::Ready);
        assert_eq!(session.channel().control_words(), vec![ControlWord::Ready]);
        assert!(session.timers().is_armed(TimerKind::Rx));

        let frame = Frame::acl(0x0001, &b"hello"[..]).unwrap();
        deliver(&mut session, &frame, 0);

        assert_eq!(frames(&mut session), vec![frame]);
        assert_eq!(session.rx_id(), 1);
        assert_eq!(session.recv_state(), RecvState::Ready);

        wake(&mut session, false);
        assert_eq!(session.recv_state(), RecvState::Idle);
        assert!(!session.rts());
        assert!(!session.timers().is_armed(TimerKind::Rx));
        assert_eq!(session.stats().frames_received, 1);
    }

    #[test]
    fn ids_advance_per_transfer() {
        let mut session = active_session();
        wake(&mut session, true);
        let sent: Vec<Frame> = (0..3u8)
            .map(|i| Frame::event(0x0e, vec![i; usize::from(i) + 1]).unwrap())
            .collect();
        for (id, frame) in sent.iter().enumerate() {
            deliver(&mut session, frame, id as u8);
        }
        assert_eq!(frames(&mut session), sent);
        assert_eq!(session.rx_id(), 3);
    }

    #[test]
    fn out_of_sequence_id_resets() {
        let mut session = active_session();
        wake(&mut session, true);
        announce(&mut session, 2, 5);

        assert_eq!(session.main_state(), MainState::Init);
        assert!(matches!(
            session.drain_notifications().as_slice(),
            [Notification::LinkDown { kind: ErrorKind::ProtocolMismatch, reason }]
                if reason.contains("out of sequence")
        ));
    }

    #[test]
    fn oversized_announcement_is_fatal() {
        let mut session = active_session();
        announce(&mut session, 2000, 0);
        assert_eq!(session.main_state(), MainState::Init);
        assert!(matches!(
            session.drain_notifications().as_slice(),
            [Notification::LinkDown {
                kind: ErrorKind::ProtocolMismatch,
                ..
            }]
        ));
    }

    #[test]
    fn oversized_stream_header_is_skipped() {
        let mut session = crate::testing::session();
        session.start_handshake();
        // ACL header declaring 5000 bytes against a 4096 byte buffer.
        feed(&mut session, &[0x02, 0x01, 0x00, 0x88, 0x13]);

        assert_eq!(session.rx_garbage_bytes(), 904);
        assert_eq!(session.stats().oversized, 1);
        assert_eq!(session.stats().rx_errors, 1);
        assert_eq!(session.main_state(), MainState::Handshake);
        assert!(session.drain_notifications().is_empty());

        feed(&mut session, &[0u8; 904]);
        assert_eq!(session.rx_garbage_bytes(), 0);
        assert_eq!(session.stats().rx_errors, 1);

        // The stream resynchronises on the next frame.
        feed(&mut session, &crate::testing::negotiation_response(2, 5));
        assert_ne!(session.handshake_step(), Some(crate::state::HandshakeStep::Negotiate));
    }

    #[test]
    fn oversized_header_between_transfers_is_skipped() {
        let mut session = active_session();
        feed(&mut session, &[0x02, 0x01, 0x00, 0x88, 0x13]);

        assert_eq!(session.rx_garbage_bytes(), 904);
        assert_eq!(session.stats().oversized, 1);
        assert_eq!(session.stats().rx_errors, 1);
        assert_eq!(session.main_state(), MainState::Active);
        assert!(session.drain_notifications().is_empty());

        feed(&mut session, &[0xaa; 904]);
        assert_eq!(session.rx_garbage_bytes(), 0);
        assert_eq!(session.stats().rx_errors, 1);

        wake(&mut session, true);
        let sent: Vec<Frame> = (0..3u8)
            .map(|i| Frame::acl(0x0001, vec![i; usize::from(i) + 2]).unwrap())
            .collect();
        for (id, frame) in sent.iter().enumerate() {
            deliver(&mut session, frame, id as u8);
        }
        assert_eq!(frames(&mut session), sent);
        assert_eq!(session.rx_id(), 3);
        assert_eq!(session.stats().rx_errors, 1);
    }

    #[test]
    fn oversized_header_split_across_reads() {
        let mut session = active_session();
        feed(&mut session, &[0x02, 0x01, 0x00, 0x88]);
        assert_eq!(session.rx_garbage_bytes(), 0);
        assert_eq!(session.stats().rx_errors, 0);

        let frame = Frame::acl(0x0001, &b"after"[..]).unwrap();
        let mut rest = vec![0x13];
        rest.extend_from_slice(&[0xaa; 904]);
        rest.extend_from_slice(&transfer_bytes(&frame));
        feed(&mut session, &rest);
        assert_eq!(session.stats().oversized, 1);
        assert_eq!(session.rx_garbage_bytes(), 0);

        announce(&mut session, (transfer_bytes(&frame).len() / 4) as u16, 0);
        assert_eq!(frames(&mut session), vec![frame]);
        assert_eq!(session.stats().rx_errors, 1);
    }

    #[test]
    fn oversized_excess_is_not_taken_as_transfer_data() {
        let mut session = active_session();
        feed(&mut session, &[0x02, 0x01, 0x00, 0x88, 0x13]);

        // The next transfer is announced before the excess has arrived.
        let frame = Frame::event(0x0e, vec![1, 2, 3]).unwrap();
        let bytes = transfer_bytes(&frame);
        announce(&mut session, (bytes.len() / 4) as u16, 0);
        let mut tail = vec![0xaa; 904];
        tail.extend_from_slice(&bytes);
        feed(&mut session, &tail);

        assert_eq!(frames(&mut session), vec![frame]);
        assert_eq!(session.rx_garbage_bytes(), 0);
        assert_eq!(session.stats().rx_errors, 1);
    }

    #[test]
    fn transfer_split_across_reads() {
        let mut session = active_session();
        let frame = Frame::sco(0x0003, vec![7u8; 30]).unwrap();
        let bytes = transfer_bytes(&frame);
        announce(&mut session, (bytes.len() / 4) as u16, 0);

        feed(&mut session, &bytes[..10]);
        assert_eq!(session.recv_state(), RecvState::Receiving);
        assert!(frames(&mut session).is_empty());

        feed(&mut session, &bytes[10..]);
        assert_eq!(frames(&mut session), vec![frame]);
        assert_eq!(session.recv_state(), RecvState::Idle);
    }

    #[test]
    fn announcements_queue_behind_the_current_transfer() {
        let mut session = active_session();
        let first = Frame::acl(1, &b"first"[..]).unwrap();
        let second = Frame::acl(1, &b"second!"[..]).unwrap();
        let a = transfer_bytes(&first);
        let b = transfer_bytes(&second);

        announce(&mut session, (a.len() / 4) as u16, 0);
        announce(&mut session, (b.len() / 4) as u16, 1);
        assert_eq!(session.pending_rx_len(), 1);

        let mut both = a.clone();
        both.extend_from_slice(&b);
        feed(&mut session, &both);

        assert_eq!(frames(&mut session), vec![first, second]);
        assert_eq!(session.pending_rx_len(), 0);
        assert_eq!(session.rx_id(), 2);
    }

    #[test]
    fn rts_release_waits_for_tx_empty() {
        let mut session = active_session();
        wake(&mut session, true);
        deliver(&mut session, &Frame::acl(1, &b"x"[..]).unwrap(), 0);

        session.channel_mut().tx_busy = true;
        wake(&mut session, false);
        assert_eq!(session.recv_state(), RecvState::Idle);
        assert!(session.rts());

        session.channel_mut().tx_busy = false;
        session.handle(ChannelEvent::TxEmpty);
        assert!(!session.rts());
        assert!(!session.channel().rts);
    }

    #[test]
    fn alive_request_is_answered() {
        let mut session = active_session();
        feed(&mut session, &wire(&AlivePacket::request().into_frame()));
        assert_eq!(
            session.channel().writes,
            vec![wire(&AlivePacket::response().into_frame())]
        );
        assert_eq!(session.main_state(), MainState::Active);
        assert_eq!(session.stats().rx_errors, 0);
    }

    #[test]
    fn bytes_ahead_of_their_announcement_are_held() {
        let mut session = active_session();
        let frame = Frame::acl(1, &b"early"[..]).unwrap();
        let bytes = transfer_bytes(&frame);
        feed(&mut session, &bytes);
        assert!(session.drain_notifications().is_empty());
        assert_eq!(session.stats().rx_errors, 0);

        announce(&mut session, (bytes.len() / 4) as u16, 0);
        assert_eq!(frames(&mut session), vec![frame]);
        assert_eq!(session.main_state(), MainState::Active);
    }

    #[test]
    fn back_to_back_transfers_already_buffered() {
        let mut session = active_session();
        let first = Frame::event(0x0e, vec![1u8; 5]).unwrap();
        let second = Frame::radio(0x02, vec![2u8; 9]).unwrap();
        let a = transfer_bytes(&first);
        let b = transfer_bytes(&second);

        // Both transfers' bytes are waiting before either announcement is
        // processed.
        session.channel_mut().inbox.extend_from_slice(&a);
        session.channel_mut().inbox.extend_from_slice(&b);
        announce(&mut session, (a.len() / 4) as u16, 0);
        announce(&mut session, (b.len() / 4) as u16, 1);
        session.handle(ChannelEvent::DataReady);

        assert_eq!(frames(&mut session), vec![first, second]);
        assert_eq!(session.stats().rx_errors, 0);
    }

    #[test]
    fn link_control_frame_inside_transfer_is_dropped() {
        let mut session = active_session();
        deliver(&mut session, &AlivePacket::response().into_frame(), 0);
        assert!(frames(&mut session).is_empty());
        assert_eq!(session.rx_id(), 1);
        assert_eq!(session.stats().rx_errors, 1);
    }

    #[test]
    fn control_queue_overflow_drops_without_reset() {
        let mut session = active_session();
        for _ in 0..5 {
            wake(&mut session, true);
            wake(&mut session, false);
        }
        assert_eq!(session.stats().control_dropped, 1);
        assert_eq!(session.control_queue_len(), 4);
        assert_eq!(session.channel().controls.len(), 1);
        assert_eq!(session.main_state(), MainState::Active);
    }

    #[test]
    fn silent_peer_times_out_receive() {
        let mut session = active_session();
        wake(&mut session, true);
        assert!(session.rts());
        session.handle(TimerKind::Rx);

        assert_fully_reset(&session);
        assert!(matches!(
            session.drain_notifications().as_slice(),
            [Notification::LinkDown { kind: ErrorKind::Timeout, reason }]
                if reason.contains("receive")
        ));
    }

    #[test]
    fn partial_transfer_times_out_and_is_discarded() {
        let mut session = active_session();
        wake(&mut session, true);
        let first = Frame::acl(1, vec![5u8; 20]).unwrap();
        let second = Frame::acl(1, &b"queued"[..]).unwrap();
        let bytes = transfer_bytes(&first);
        announce(&mut session, (bytes.len() / 4) as u16, 0);
        announce(&mut session, (transfer_bytes(&second).len() / 4) as u16, 1);
        feed(&mut session, &bytes[..9]);
        assert_eq!(session.recv_state(), RecvState::Receiving);
        assert_eq!(session.pending_rx_len(), 1);

        session.handle(TimerKind::Rx);
        assert_fully_reset(&session);
        assert!(matches!(
            session.drain_notifications().as_slice(),
            [Notification::LinkDown { kind: ErrorKind::Timeout, reason }]
                if reason.contains("receive")
        ));
        assert_eq!(session.stats().frames_received, 0);

        // The rest of the stale transfer arrives on the dead link.
        feed(&mut session, &bytes[9..]);
        assert!(session.drain_notifications().is_empty());
        assert_fully_reset(&session);
    }

    #[test]
    fn odd_control_words_are_tolerated() {
        let mut session = active_session();
        session.handle(ChannelEvent::Control(ControlWord::BootInfoReq(1).to_u32()));
        session.handle(ChannelEvent::Control(ControlWord::Dummy.to_u32()));
        session.handle(ChannelEvent::Control(ControlWord::SwBreak.to_u32()));
        assert_eq!(session.stats().rx_errors, 0);

        session.handle(ChannelEvent::Control(0x5000_0000));
        assert_eq!(session.stats().rx_errors, 1);
        assert_eq!(session.main_state(), MainState::Active);
    }

    #[test]
    fn zero_word_transfer_completes_immediately() {
        let mut session = active_session();
        announce(&mut session, 0, 0);
        assert_eq!(session.rx_id(), 1);
        assert_eq!(session.recv_state(), RecvState::Idle);
        assert_eq!(session.stats().rx_errors, 1);
    }
}
