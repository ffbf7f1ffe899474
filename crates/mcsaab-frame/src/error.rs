use crate::packet::PacketType;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The type tag does not name a known packet type.
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),

    /// A received header declared more payload than the receive buffer holds.
    /// The excess is skipped as garbage; the stream stays usable.
    #[error("frame too large ({declared} bytes, capacity {capacity})")]
    FrameTooLarge { declared: usize, capacity: usize },

    /// The payload does not fit the length field of its packet type.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The header's length field disagrees with the payload.
    #[error("{packet_type} header declares {declared} bytes, payload has {actual}")]
    LengthMismatch {
        packet_type: PacketType,
        declared: usize,
        actual: usize,
    },

    /// The buffer ended before the frame did.
    #[error("truncated frame ({needed} bytes needed, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// A negotiation, alive, or control payload is malformed.
    #[error("invalid {what}: {reason}")]
    InvalidPayload { what: &'static str, reason: String },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors after which the decoder has already resynchronised
    /// and decoding may simply continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FrameError::UnknownPacketType(_) | FrameError::FrameTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
