//! McSAAB control words.
//!
//! ```text
//!  31    28 27                                         0
//! ┌────────┬────────────────────────────────────────────┐
//! │ command│ payload                                     │
//! └────────┴────────────────────────────────────────────┘
//! START_TRANS payload: bits 23..8 length in words, bits 7..0 message id
//! BOOT_INFO payload:   bits 27..24 version id
//! ```

use std::fmt;

use crate::error::{FrameError, Result};

const CMD_SHIFT: u32 = 28;
const PAYLOAD_MASK: u32 = 0x0fff_ffff;

const CMD_SW_BREAK: u32 = 0x0;
const CMD_BOOT_INFO_REQ: u32 = 0x1;
const CMD_BOOT_INFO_RESP: u32 = 0x2;
const CMD_START_TRANS: u32 = 0x3;
const CMD_READY: u32 = 0x4;
const CMD_DUMMY: u32 = 0xc;

const DUMMY_PAYLOAD: u32 = 0x0aaa_aaaa;
const VERSION_SHIFT: u32 = 24;

/// A decoded McSAAB control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWord {
    /// Sender is idle and about to drop its wake line.
    SwBreak,
    /// Boot information request carrying the sender's version id.
    BootInfoReq(u8),
    /// Boot information response carrying the sender's version id.
    BootInfoResp(u8),
    /// A data transfer of `len` 32-bit words with sequence id `msg_id` follows.
    StartTrans { len: u16, msg_id: u8 },
    /// Receiver is ready for a transfer.
    Ready,
    /// Keep-alive filler.
    Dummy,
}

impl ControlWord {
    /// Encode to the 32-bit wire word.
    pub fn to_u32(self) -> u32 {
        match self {
            ControlWord::SwBreak => CMD_SW_BREAK << CMD_SHIFT,
            ControlWord::BootInfoReq(ver) => {
                (CMD_BOOT_INFO_REQ << CMD_SHIFT) | (u32::from(ver & 0x0f) << VERSION_SHIFT)
            }
            ControlWord::BootInfoResp(ver) => {
                (CMD_BOOT_INFO_RESP << CMD_SHIFT) | (u32::from(ver & 0x0f) << VERSION_SHIFT)
            }
            ControlWord::StartTrans { len, msg_id } => {
                (CMD_START_TRANS << CMD_SHIFT) | (u32::from(len) << 8) | u32::from(msg_id)
            }
            ControlWord::Ready => CMD_READY << CMD_SHIFT,
            ControlWord::Dummy => (CMD_DUMMY << CMD_SHIFT) | DUMMY_PAYLOAD,
        }
    }

    /// Decode a 32-bit wire word.
    pub fn from_u32(word: u32) -> Result<Self> {
        let payload = word & PAYLOAD_MASK;
        match word >> CMD_SHIFT {
            CMD_SW_BREAK => Ok(ControlWord::SwBreak),
            CMD_BOOT_INFO_REQ => Ok(ControlWord::BootInfoReq(version(payload))),
            CMD_BOOT_INFO_RESP => Ok(ControlWord::BootInfoResp(version(payload))),
            CMD_START_TRANS => Ok(ControlWord::StartTrans {
                len: ((payload >> 8) & 0xffff) as u16,
                msg_id: (payload & 0xff) as u8,
            }),
            CMD_READY => Ok(ControlWord::Ready),
            CMD_DUMMY => Ok(ControlWord::Dummy),
            cmd => Err(FrameError::InvalidPayload {
                what: "control word",
                reason: format!("unknown command {cmd:#x} in {word:#010x}"),
            }),
        }
    }

    /// Short upper-case command name.
    pub fn name(&self) -> &'static str {
        match self {
            ControlWord::SwBreak => "SW_BREAK",
            ControlWord::BootInfoReq(_) => "BOOT_INFO_REQ",
            ControlWord::BootInfoResp(_) => "BOOT_INFO_RESP",
            ControlWord::StartTrans { .. } => "START_TRANS",
            ControlWord::Ready => "READY",
            ControlWord::Dummy => "DUMMY",
        }
    }
}

fn version(payload: u32) -> u8 {
    ((payload >> VERSION_SHIFT) & 0x0f) as u8
}

impl fmt::Display for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlWord::StartTrans { len, msg_id } => {
                write!(f, "START_TRANS(len={len}, id={msg_id})")
            }
            ControlWord::BootInfoReq(ver) | ControlWord::BootInfoResp(ver) => {
                write!(f, "{}(ver={ver})", self.name())
            }
            other => f.write_str(other.name()),
        }
    }
}

impl From<ControlWord> for u32 {
    fn from(word: ControlWord) -> Self {
        word.to_u32()
    }
}

impl TryFrom<u32> for ControlWord {
    type Error = FrameError;

    fn try_from(word: u32) -> Result<Self> {
        ControlWord::from_u32(word)
    }
}
