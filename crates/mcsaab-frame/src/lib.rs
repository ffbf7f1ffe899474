//! H4+ packet framing and McSAAB control words.
//!
//! Every packet on the wire is framed as:
//! - A 1-byte packet type tag
//! - A type-specific header whose last field is the payload length
//! - The payload
//!
//! Data-channel packets are padded to an even number of bytes; the receiver
//! skips the pad through its garbage-byte counter. Negotiation and alive
//! packets carry their own fixed layouts ([`negotiation`]), and transfers on a
//! McSAAB link are announced with 32-bit control words ([`control`]).

pub mod codec;
pub mod control;
pub mod decoder;
pub mod error;
pub mod negotiation;
pub mod packet;
pub mod reader;
#[cfg(feature = "async")]
pub mod tokio_codec;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_RX_CAPACITY};
pub use control::ControlWord;
pub use decoder::{DecoderState, DecoderStats, FrameDecoder};
pub use error::{FrameError, Result};
pub use negotiation::{
    AlivePacket, NegotiationRequest, NegotiationResponse, ALIVE_REQ, ALIVE_RESP, NEG_ACK,
    NEG_NAK, NEG_REQ, PROTO_BYTE, PROTO_PKT,
};
pub use packet::{HeaderLayout, PacketType};
pub use reader::FrameReader;
#[cfg(feature = "async")]
pub use tokio_codec::H4Codec;
pub use writer::FrameWriter;
