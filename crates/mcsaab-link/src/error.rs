use std::fmt;
use std::time::Duration;

use mcsaab_channel::ChannelError;
use mcsaab_frame::FrameError;
use serde::{Deserialize, Serialize};

/// Coarse classification of link errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A watchdog or handshake step deadline passed, or the peer reset.
    Timeout,
    /// The peer violated the protocol.
    ProtocolMismatch,
    /// A frame does not fit the receive buffer or a transfer.
    FrameTooLarge,
    /// A bounded queue overflowed; the entry was dropped.
    QueueFull,
    /// The channel failed.
    ChannelFault,
    /// The link is not up.
    NotActive,
    /// Configuration values are unusable.
    InvalidConfig,
}

impl ErrorKind {
    /// Fatal kinds take the full reset path.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::ProtocolMismatch | ErrorKind::ChannelFault
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProtocolMismatch => "protocol_mismatch",
            ErrorKind::FrameTooLarge => "frame_too_large",
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::ChannelFault => "channel_fault",
            ErrorKind::NotActive => "not_active",
            ErrorKind::InvalidConfig => "invalid_config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Channel-level error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A watchdog or handshake deadline passed.
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    /// The peer sent something the protocol does not allow here.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// A bounded queue is full.
    #[error("{queue} queue full ({capacity} entries)")]
    QueueFull {
        queue: &'static str,
        capacity: usize,
    },

    /// Frames can only be queued while the link is up.
    #[error("link is not active")]
    NotActive,

    /// The peer pulled its reset line.
    #[error("peer reset")]
    PeerReset,

    /// The channel reported a hardware fault.
    #[error("channel fault: {0}")]
    Fault(String),

    /// Negotiation failed; carries the kind and message of the cause.
    #[error("handshake failed ({kind}): {reason}")]
    Handshake { kind: ErrorKind, reason: String },

    /// Configuration values are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The link worker thread is gone.
    #[error("link stopped")]
    Stopped,
}

impl LinkError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Channel(_) | LinkError::Fault(_) | LinkError::Stopped => {
                ErrorKind::ChannelFault
            }
            LinkError::Frame(FrameError::FrameTooLarge { .. })
            | LinkError::Frame(FrameError::PayloadTooLarge { .. }) => ErrorKind::FrameTooLarge,
            LinkError::Frame(FrameError::Io(_)) => ErrorKind::ChannelFault,
            LinkError::Frame(_) | LinkError::ProtocolMismatch(_) => ErrorKind::ProtocolMismatch,
            LinkError::Timeout { .. } | LinkError::PeerReset => ErrorKind::Timeout,
            LinkError::QueueFull { .. } => ErrorKind::QueueFull,
            LinkError::NotActive => ErrorKind::NotActive,
            LinkError::Handshake { kind, .. } => *kind,
            LinkError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// True when this error takes the full reset path.
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
