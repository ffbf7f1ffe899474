//! Scripted channel and helpers shared by the session tests.

use bytes::BytesMut;
use mcsaab_channel::{ChannelError, ChannelEvent, LinkChannel, Notifier};
use mcsaab_frame::{
    encode_frame, AlivePacket, ControlWord, Frame, NegotiationRequest, NegotiationResponse,
    PROTO_BYTE,
};

use crate::config::LinkConfig;
use crate::session::LinkSession;
use crate::state::{MainState, RecvState, SendState};
use crate::timer::ManualTimers;

/// Records every call; the test decides what the peer does.
#[derive(Debug, Default)]
pub(crate) struct ScriptedChannel {
    pub writes: Vec<Vec<u8>>,
    pub controls: Vec<u32>,
    pub inbox: BytesMut,
    pub local_wake: bool,
    pub wake_log: Vec<bool>,
    pub peer_wake: bool,
    pub rts: bool,
    pub cts: bool,
    pub auto_flow: bool,
    pub speeds: Vec<u32>,
    pub tx_busy: bool,
    pub fail_writes: bool,
    pub reject_speed: Option<u32>,
    pub cancels: usize,
}

impl ScriptedChannel {
    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.controls.clear();
        self.wake_log.clear();
        self.speeds.clear();
        self.cancels = 0;
    }

    /// Control words sent, decoded.
    pub fn control_words(&self) -> Vec<ControlWord> {
        self.controls
            .iter()
            .map(|raw| ControlWord::from_u32(*raw).unwrap())
            .collect()
    }
}

impl LinkChannel for ScriptedChannel {
    fn set_notifier(&mut self, _notifier: Notifier) {}

    fn write(&mut self, bytes: &[u8]) -> mcsaab_channel::Result<()> {
        if self.fail_writes {
            return Err(ChannelError::Closed);
        }
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn write_control(&mut self, word: u32) -> mcsaab_channel::Result<()> {
        if self.fail_writes {
            return Err(ChannelError::Closed);
        }
        self.controls.push(word);
        Ok(())
    }

    fn read_into(&mut self, buf: &mut [u8]) -> mcsaab_channel::Result<usize> {
        let n = self.inbox.len().min(buf.len());
        buf[..n].copy_from_slice(&self.inbox.split_to(n));
        Ok(n)
    }

    fn set_local_wake(&mut self, on: bool) {
        self.local_wake = on;
        self.wake_log.push(on);
    }

    fn peer_wake(&self) -> bool {
        self.peer_wake
    }

    fn tx_empty(&self) -> bool {
        !self.tx_busy
    }

    fn data_ready(&self) -> bool {
        !self.inbox.is_empty()
    }

    fn set_speed(&mut self, baud: u32) -> mcsaab_channel::Result<()> {
        if self.reject_speed == Some(baud) {
            return Err(ChannelError::UnsupportedSpeed(baud));
        }
        self.speeds.push(baud);
        Ok(())
    }

    fn set_rts(&mut self, on: bool) {
        self.rts = on;
    }

    fn cts(&self) -> bool {
        self.cts
    }

    fn set_auto_flow(&mut self, on: bool) {
        self.auto_flow = on;
    }

    fn cancel_io(&mut self) {
        self.cancels += 1;
        self.inbox.clear();
    }
}

pub(crate) type TestSession = LinkSession<ScriptedChannel, ManualTimers>;

pub(crate) fn session() -> TestSession {
    LinkSession::new(
        ScriptedChannel::default(),
        ManualTimers::new(),
        LinkConfig::default(),
    )
}

pub(crate) fn wire(frame: &Frame) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_frame(frame, &mut buf).unwrap();
    buf.to_vec()
}

/// The bytes a peer sends for one transfer: the frame padded to whole words.
pub(crate) fn transfer_bytes(frame: &Frame) -> Vec<u8> {
    let mut bytes = wire(frame);
    bytes.resize(bytes.len().div_ceil(4) * 4, 0);
    bytes
}

/// Deliver `bytes` on the data stream.
pub(crate) fn feed(session: &mut TestSession, bytes: &[u8]) {
    session.channel_mut().inbox.extend_from_slice(bytes);
    session.handle(ChannelEvent::DataReady);
}

/// Deliver a START_TRANS control word.
pub(crate) fn announce(session: &mut TestSession, words: u16, msg_id: u8) {
    let word = ControlWord::StartTrans {
        len: words,
        msg_id,
    };
    session.handle(ChannelEvent::Control(word.to_u32()));
}

/// Announce and deliver one frame the way the peer would.
pub(crate) fn deliver(session: &mut TestSession, frame: &Frame, msg_id: u8) {
    let bytes = transfer_bytes(frame);
    announce(session, (bytes.len() / 4) as u16, msg_id);
    feed(session, &bytes);
}

pub(crate) fn negotiation_response(man_id: u8, ver_id: u8) -> Vec<u8> {
    let request = NegotiationRequest::new(0x01a1, PROTO_BYTE, 38_400);
    wire(&NegotiationResponse::accept(&request, man_id, ver_id).into_frame())
}

pub(crate) fn alive_response() -> Vec<u8> {
    wire(&AlivePacket::response().into_frame())
}

/// A session that completed its handshake, with logs and notifications
/// cleared.
pub(crate) fn active_session() -> TestSession {
    let mut session = session();
    session.channel_mut().cts = true;
    session.start_handshake();
    session.handle(ChannelEvent::WriteComplete);
    feed(&mut session, &negotiation_response(2, 5));
    session.handle(ChannelEvent::WriteComplete);
    feed(&mut session, &alive_response());
    assert_eq!(session.main_state(), MainState::Active);
    session.drain_notifications();
    session.channel_mut().clear_log();
    session
}

/// Check that a fatal error left nothing of the old link behind: back in
/// `Init` with empty queues, no partial transfer, wake and RTS down and
/// every timer idle.
pub(crate) fn assert_fully_reset(session: &TestSession) {
    assert_eq!(session.main_state(), MainState::Init);
    assert_eq!(session.handshake_step(), None);
    assert_eq!(session.send_state(), SendState::Idle);
    assert_eq!(session.recv_state(), RecvState::Idle);
    assert_eq!((session.tx_id(), session.rx_id()), (0, 0));

    assert_eq!(session.tx_queue_len(), 0);
    assert!(session.tx_current.is_none());
    assert_eq!(session.pending_rx_len(), 0);
    assert!(session.rx_transfer.is_none());
    assert!(session.rx_early.is_empty());
    assert_eq!(session.control_queue_len(), 0);
    assert!(session.writes.is_empty());
    assert_eq!(session.rx_garbage_bytes(), 0);

    assert!(!session.local_wake());
    assert!(!session.channel().local_wake);
    assert!(!session.rts());
    assert!(!session.channel().rts);
    assert!(session.peer().is_none());
    assert!(session.timers().all_idle());
}
