//! McSAAB / H4+ serial link framing and negotiation.
//!
//! A host and a wireless controller share a UART plus a few signal lines.
//! This crate bundles the pieces that run the host side of that link.
//!
//! # Crate Structure
//!
//! - [`channel`]: the physical link abstraction and an in-memory pair
//! - [`frame`]: H4+ packet framing, the streaming decoder and control words
//! - [`link`]: negotiation, transfer state machines and the threaded driver

/// Re-export channel types.
pub mod channel {
    pub use mcsaab_channel::*;
}

/// Re-export frame types.
pub mod frame {
    pub use mcsaab_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use mcsaab_link::*;
}
