//! H4+ packet types and their header layouts.
//!
//! Tags 0x01-0x04 follow the HCI UART transport; 0x06-0x08 are the H4+
//! vendor extensions used for link negotiation, liveness checks and radio
//! configuration.

use std::fmt;

/// Where the payload length lives inside a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLayout {
    /// Total header length in bytes (after the type tag).
    pub len: usize,
    /// Byte offset of the length field inside the header.
    pub length_offset: usize,
    /// Width of the length field: 1 byte, or 2 bytes little-endian.
    pub length_width: usize,
}

impl HeaderLayout {
    const fn new(len: usize, length_offset: usize, length_width: usize) -> Self {
        Self {
            len,
            length_offset,
            length_width,
        }
    }

    fn length_range(&self) -> std::ops::Range<usize> {
        self.length_offset..self.length_offset + self.length_width
    }

    /// Decode the payload length from a header.
    ///
    /// Returns `None` when `header` is too short to hold the length field.
    pub fn payload_len(&self, header: &[u8]) -> Option<usize> {
        match header.get(self.length_range())? {
            [len] => Some(usize::from(*len)),
            [lo, hi] => Some(usize::from(u16::from_le_bytes([*lo, *hi]))),
            _ => None,
        }
    }

    /// Write a payload length into a header buffer.
    ///
    /// Returns `false` and leaves `header` untouched when it is too short.
    pub fn write_payload_len(&self, header: &mut [u8], len: usize) -> bool {
        let Some(field) = header.get_mut(self.length_range()) else {
            return false;
        };
        match field {
            [byte] => *byte = len as u8,
            _ => field.copy_from_slice(&(len as u16).to_le_bytes()),
        }
        true
    }

    /// Largest payload the length field can express.
    pub fn max_payload(&self) -> usize {
        match self.length_width {
            1 => u8::MAX as usize,
            _ => u16::MAX as usize,
        }
    }
}

/// H4+ packet type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// HCI command (host to controller).
    Command = 0x01,
    /// HCI ACL data.
    Acl = 0x02,
    /// HCI SCO data.
    Sco = 0x03,
    /// HCI event (controller to host).
    Event = 0x04,
    /// Link speed and mode negotiation.
    Negotiation = 0x06,
    /// Liveness check after negotiation.
    Alive = 0x07,
    /// Raw radio configuration.
    Radio = 0x08,
}

impl PacketType {
    /// All known packet types, in tag order.
    pub const ALL: [PacketType; 7] = [
        PacketType::Command,
        PacketType::Acl,
        PacketType::Sco,
        PacketType::Event,
        PacketType::Negotiation,
        PacketType::Alive,
        PacketType::Radio,
    ];

    /// Look up a packet type by its tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(PacketType::Command),
            0x02 => Some(PacketType::Acl),
            0x03 => Some(PacketType::Sco),
            0x04 => Some(PacketType::Event),
            0x06 => Some(PacketType::Negotiation),
            0x07 => Some(PacketType::Alive),
            0x08 => Some(PacketType::Radio),
            _ => None,
        }
    }

    /// The wire tag.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Header layout for this packet type.
    pub fn layout(self) -> HeaderLayout {
        match self {
            PacketType::Command => HeaderLayout::new(3, 2, 1),
            PacketType::Acl => HeaderLayout::new(4, 2, 2),
            PacketType::Sco => HeaderLayout::new(3, 2, 1),
            PacketType::Event => HeaderLayout::new(2, 1, 1),
            PacketType::Negotiation => HeaderLayout::new(1, 0, 1),
            PacketType::Alive => HeaderLayout::new(1, 0, 1),
            PacketType::Radio => HeaderLayout::new(2, 1, 1),
        }
    }

    /// Header length in bytes (after the type tag).
    pub fn header_len(self) -> usize {
        self.layout().len
    }

    /// Negotiation and alive packets belong to link management; everything
    /// else is data for the upper layer.
    pub fn is_link_control(self) -> bool {
        matches!(self, PacketType::Negotiation | PacketType::Alive)
    }

    /// Returns a human-readable name for the packet type.
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Command => "COMMAND",
            PacketType::Acl => "ACL",
            PacketType::Sco => "SCO",
            PacketType::Event => "EVENT",
            PacketType::Negotiation => "NEGOTIATION",
            PacketType::Alive => "ALIVE",
            PacketType::Radio => "RADIO",
        }
    }

    /// Parse a packet type from its name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
