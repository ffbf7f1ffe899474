use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::packet::PacketType;

/// Default receive buffer capacity for a single frame payload.
pub const DEFAULT_RX_CAPACITY: usize = 4096;

/// An H4+ frame.
///
/// `header` is the complete on-wire header, including the length field, so a
/// decoded frame re-encodes to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The packet type tag.
    pub packet_type: PacketType,
    /// Header bytes following the type tag.
    pub header: Bytes,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame from the header fields that precede the length field.
    ///
    /// The length field is filled in from `payload`.
    pub fn build(packet_type: PacketType, fields: &[u8], payload: impl Into<Bytes>) -> Result<Self> {
        let layout = packet_type.layout();
        let payload = payload.into();

        if fields.len() != layout.length_offset {
            return Err(FrameError::InvalidPayload {
                what: "header",
                reason: format!(
                    "{packet_type} takes {} header field bytes, got {}",
                    layout.length_offset,
                    fields.len()
                ),
            });
        }
        if payload.len() > layout.max_payload() {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: layout.max_payload(),
            });
        }

        let mut header = vec![0u8; layout.len];
        header[..fields.len()].copy_from_slice(fields);
        layout.write_payload_len(&mut header, payload.len());

        Ok(Self {
            packet_type,
            header: header.into(),
            payload,
        })
    }

    /// HCI command with `opcode`.
    pub fn command(opcode: u16, payload: impl Into<Bytes>) -> Result<Self> {
        Self::build(PacketType::Command, &opcode.to_le_bytes(), payload)
    }

    /// ACL data on connection `handle` (including packet boundary flags).
    pub fn acl(handle: u16, payload: impl Into<Bytes>) -> Result<Self> {
        Self::build(PacketType::Acl, &handle.to_le_bytes(), payload)
    }

    /// SCO data on connection `handle`.
    pub fn sco(handle: u16, payload: impl Into<Bytes>) -> Result<Self> {
        Self::build(PacketType::Sco, &handle.to_le_bytes(), payload)
    }

    /// HCI event with event code `code`.
    pub fn event(code: u8, payload: impl Into<Bytes>) -> Result<Self> {
        Self::build(PacketType::Event, &[code], payload)
    }

    /// Radio configuration packet for radio event `event`.
    pub fn radio(event: u8, payload: impl Into<Bytes>) -> Result<Self> {
        Self::build(PacketType::Radio, &[event], payload)
    }

    /// Negotiation packet.
    pub fn negotiation(payload: impl Into<Bytes>) -> Result<Self> {
        Self::build(PacketType::Negotiation, &[], payload)
    }

    /// Alive packet.
    pub fn alive(payload: impl Into<Bytes>) -> Result<Self> {
        Self::build(PacketType::Alive, &[], payload)
    }

    /// Header fields that precede the length field (opcode, handle, event code).
    ///
    /// A hand-built frame with a short header yields whatever bytes it has.
    pub fn fields(&self) -> &[u8] {
        let end = self.packet_type.layout().length_offset.min(self.header.len());
        &self.header[..end]
    }

    /// Payload length as declared by the header, if the header holds one.
    pub fn declared_len(&self) -> Option<usize> {
        self.packet_type.layout().payload_len(&self.header)
    }

    /// True when the encoder appends an alignment pad byte.
    pub fn needs_pad(&self) -> bool {
        !self.packet_type.is_link_control() && (1 + self.header.len() + self.payload.len()) % 2 == 1
    }

    /// The total wire size of this frame (tag + header + payload + pad).
    pub fn wire_size(&self) -> usize {
        1 + self.header.len() + self.payload.len() + usize::from(self.needs_pad())
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬───────────────────────┬──────────────┬─────────────┐
/// │ Type (1B)│ Header (1-4B)         │ Payload      │ Pad (0-1B)  │
/// │          │ ... length field last │ (length B)   │ data only   │
/// └──────────┴───────────────────────┴──────────────┴─────────────┘
/// ```
///
/// Data-channel frames are padded with one zero byte when the total length is
/// odd. The pad is not counted in the length field.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let layout = frame.packet_type.layout();
    let declared = match layout.payload_len(&frame.header) {
        Some(declared) if frame.header.len() == layout.len => declared,
        _ => {
            return Err(FrameError::InvalidPayload {
                what: "header",
                reason: format!(
                    "{} header is {} bytes, got {}",
                    frame.packet_type,
                    layout.len,
                    frame.header.len()
                ),
            });
        }
    };
    if declared != frame.payload.len() {
        return Err(FrameError::LengthMismatch {
            packet_type: frame.packet_type,
            declared,
            actual: frame.payload.len(),
        });
    }

    dst.reserve(frame.wire_size());
    dst.put_u8(frame.packet_type.as_u8());
    dst.put_slice(&frame.header);
    dst.put_slice(&frame.payload);
    if frame.needs_pad() {
        dst.put_u8(0);
    }
    Ok(())
}

/// Decode the single frame at the start of `src`.
///
/// Anything after the frame (alignment or word padding) is ignored. Used for
/// transfers whose extent is already known, where the streaming
/// [`FrameDecoder`](crate::decoder::FrameDecoder) is not needed.
pub fn decode_frame(src: &[u8], capacity: usize) -> Result<Frame> {
    let (&tag, rest) = src.split_first().ok_or(FrameError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let packet_type = PacketType::from_u8(tag).ok_or(FrameError::UnknownPacketType(tag))?;
    let layout = packet_type.layout();

    let truncated = || FrameError::Truncated {
        needed: 1 + layout.len,
        available: src.len(),
    };
    let header = rest.get(..layout.len).ok_or_else(truncated)?;
    let declared = layout.payload_len(header).ok_or_else(truncated)?;
    if declared > capacity {
        return Err(FrameError::FrameTooLarge { declared, capacity });
    }

    let body = &rest[layout.len..];
    if body.len() < declared {
        return Err(FrameError::Truncated {
            needed: 1 + layout.len + declared,
            available: src.len(),
        });
    }

    Ok(Frame {
        packet_type,
        header: Bytes::copy_from_slice(header),
        payload: Bytes::copy_from_slice(&body[..declared]),
    })
}

/// Configuration for frame readers and decoders.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload the receive buffer holds. Default: 4096 bytes.
    pub rx_capacity: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            rx_capacity: DEFAULT_RX_CAPACITY,
        }
    }
}
