//! Negotiation and alive packet payloads.
//!
//! ```text
//! negotiation request (10 bytes)
//! ┌─────┬──────────┬──────────┬──────┬───────────┬───────────┐
//! │ ack │ baud LE  │ reserved │ mode │ sysclk LE │ reserved  │
//! │ 1B  │ 2B       │ 2B       │ 1B   │ 2B        │ 2B        │
//! └─────┴──────────┴──────────┴──────┴───────────┴───────────┘
//! negotiation response: request layout + man_id (1B) + ver_id (1B)
//!
//! alive (2 bytes)
//! ┌────────────┬──────────┐
//! │ message id │ reserved │
//! └────────────┴──────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::Frame;
use crate::error::{FrameError, Result};
use crate::packet::PacketType;

/// Negotiation ack code: request.
pub const NEG_REQ: u8 = 0x00;
/// Negotiation ack code: parameters accepted.
pub const NEG_ACK: u8 = 0x20;
/// Negotiation ack code: parameters rejected.
pub const NEG_NAK: u8 = 0x40;

/// Packet mode protocol byte.
pub const PROTO_PKT: u8 = 0x44;
/// Byte mode protocol byte.
pub const PROTO_BYTE: u8 = 0x4c;

/// Alive request message id.
pub const ALIVE_REQ: u8 = 0x55;
/// Alive response message id.
pub const ALIVE_RESP: u8 = 0xcc;

const NEG_REQUEST_LEN: usize = 10;
const NEG_RESPONSE_LEN: usize = 12;
const ALIVE_LEN: usize = 2;

/// Link parameters proposed by the initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationRequest {
    /// Ack code; [`NEG_REQ`] for a request.
    pub ack: u8,
    /// Baud rate divisor for the negotiated speed.
    pub baud: u16,
    /// Protocol mode ([`PROTO_PKT`] or [`PROTO_BYTE`]).
    pub mode: u8,
    /// System clock parameter.
    pub sysclk: u16,
}

impl NegotiationRequest {
    /// A request proposing `baud`, `mode` and `sysclk`.
    pub fn new(baud: u16, mode: u8, sysclk: u16) -> Self {
        Self {
            ack: NEG_REQ,
            baud,
            mode,
            sysclk,
        }
    }

    /// Serialize to the 10-byte payload.
    pub fn to_payload(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(NEG_REQUEST_LEN);
        put_common(&mut buf, self.ack, self.baud, self.mode, self.sysclk);
        buf
    }

    /// Parse a request payload.
    pub fn parse(mut payload: &[u8]) -> Result<Self> {
        if payload.len() < NEG_REQUEST_LEN {
            return Err(short("negotiation request", NEG_REQUEST_LEN, payload.len()));
        }
        let (ack, baud, mode, sysclk) = get_common(&mut payload);
        Ok(Self {
            ack,
            baud,
            mode,
            sysclk,
        })
    }

    /// Wrap in a negotiation frame.
    pub fn into_frame(self) -> Frame {
        link_control_frame(PacketType::Negotiation, self.to_payload())
    }
}

/// The peer's answer to a [`NegotiationRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationResponse {
    /// [`NEG_ACK`] or [`NEG_NAK`].
    pub ack: u8,
    /// Baud rate divisor echoed by the peer.
    pub baud: u16,
    /// Protocol mode echoed by the peer.
    pub mode: u8,
    /// System clock parameter echoed by the peer.
    pub sysclk: u16,
    /// Peer manufacturer id.
    pub man_id: u8,
    /// Peer version id.
    pub ver_id: u8,
}

impl NegotiationResponse {
    /// An acknowledging response echoing `request`.
    pub fn accept(request: &NegotiationRequest, man_id: u8, ver_id: u8) -> Self {
        Self {
            ack: NEG_ACK,
            baud: request.baud,
            mode: request.mode,
            sysclk: request.sysclk,
            man_id,
            ver_id,
        }
    }

    /// True when the peer accepted the parameters.
    pub fn is_ack(&self) -> bool {
        self.ack == NEG_ACK
    }

    /// Serialize to the 12-byte payload.
    pub fn to_payload(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(NEG_RESPONSE_LEN);
        put_common(&mut buf, self.ack, self.baud, self.mode, self.sysclk);
        buf.put_u8(self.man_id);
        buf.put_u8(self.ver_id);
        buf
    }

    /// Parse a response payload.
    pub fn parse(mut payload: &[u8]) -> Result<Self> {
        if payload.len() < NEG_RESPONSE_LEN {
            return Err(short("negotiation response", NEG_RESPONSE_LEN, payload.len()));
        }
        let (ack, baud, mode, sysclk) = get_common(&mut payload);
        Ok(Self {
            ack,
            baud,
            mode,
            sysclk,
            man_id: payload.get_u8(),
            ver_id: payload.get_u8(),
        })
    }

    /// Wrap in a negotiation frame.
    pub fn into_frame(self) -> Frame {
        link_control_frame(PacketType::Negotiation, self.to_payload())
    }
}

/// Liveness check packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlivePacket {
    /// [`ALIVE_REQ`] or [`ALIVE_RESP`].
    pub mid: u8,
    /// Unused, sent as zero.
    pub reserved: u8,
}

impl AlivePacket {
    /// An alive request.
    pub fn request() -> Self {
        Self {
            mid: ALIVE_REQ,
            reserved: 0,
        }
    }

    /// An alive response.
    pub fn response() -> Self {
        Self {
            mid: ALIVE_RESP,
            reserved: 0,
        }
    }

    pub fn is_request(&self) -> bool {
        self.mid == ALIVE_REQ
    }

    pub fn is_response(&self) -> bool {
        self.mid == ALIVE_RESP
    }

    /// Parse an alive payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match payload {
            [mid, reserved, ..] => Ok(Self {
                mid: *mid,
                reserved: *reserved,
            }),
            _ => Err(short("alive packet", ALIVE_LEN, payload.len())),
        }
    }

    /// Wrap in an alive frame.
    pub fn into_frame(self) -> Frame {
        let mut payload = BytesMut::with_capacity(ALIVE_LEN);
        payload.put_u8(self.mid);
        payload.put_u8(self.reserved);
        link_control_frame(PacketType::Alive, payload)
    }
}

// Fixed-size payloads always fit the 1-byte length field.
fn link_control_frame(packet_type: PacketType, payload: BytesMut) -> Frame {
    Frame {
        packet_type,
        header: Bytes::copy_from_slice(&[payload.len() as u8]),
        payload: payload.freeze(),
    }
}

fn put_common(buf: &mut BytesMut, ack: u8, baud: u16, mode: u8, sysclk: u16) {
    buf.put_u8(ack);
    buf.put_u16_le(baud);
    buf.put_u16_le(0);
    buf.put_u8(mode);
    buf.put_u16_le(sysclk);
    buf.put_u16_le(0);
}

fn get_common(payload: &mut &[u8]) -> (u8, u16, u8, u16) {
    let ack = payload.get_u8();
    let baud = payload.get_u16_le();
    payload.advance(2);
    let mode = payload.get_u8();
    let sysclk = payload.get_u16_le();
    payload.advance(2);
    (ack, baud, mode, sysclk)
}

fn short(what: &'static str, needed: usize, got: usize) -> FrameError {
    FrameError::InvalidPayload {
        what,
        reason: format!("expected {needed} bytes, got {got}"),
    }
}
